//! Tests that run the server over a loopback socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::thread;
use std::time::Duration;

use intersection_manager::{
    LaneSpec, Message, PolicyKind, Server, ServerConfig, ServerHandle, VehicleId, MAX_DATAGRAM,
};

fn start(policy: PolicyKind) -> (SocketAddr, ServerHandle, thread::JoinHandle<()>) {
    let config = ServerConfig {
        bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
        port: 0,
        policy,
        ..Default::default()
    };
    let server = Server::bind(&config).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.handle();
    let thread = thread::spawn(move || server.run().unwrap());
    (addr, handle, thread)
}

fn client() -> (UdpSocket, VehicleId) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let id = VehicleId::new(socket.local_addr().unwrap());
    (socket, id)
}

fn receive(socket: &UdpSocket) -> Message {
    let mut buf = vec![0; MAX_DATAGRAM];
    let (len, _) = socket.recv_from(&mut buf).unwrap();
    Message::decode(&buf[..len]).unwrap()
}

#[test]
fn sequential_server_sends_reservation() {
    let (server, handle, thread) = start(PolicyKind::Sequential);
    let (socket, vehicle) = client();

    socket.send_to(b"not a message", server).unwrap();
    let request = Message::RequestAccess {
        vehicle,
        lane: LaneSpec::new("north_in", "south_out"),
        eta: 1000,
        etc: 1005,
    };
    socket.send_to(&request.encode().unwrap(), server).unwrap();

    assert_eq!(
        receive(&socket),
        Message::ReservationTime { vehicle, eta: 1000 }
    );

    let ack = Message::ReservationTimeAcknowledged { vehicle };
    socket.send_to(&ack.encode().unwrap(), server).unwrap();
    let exit = Message::Exiting { vehicle };
    socket.send_to(&exit.encode().unwrap(), server).unwrap();

    handle.stop();
    thread.join().unwrap();
}

#[test]
fn parallel_server_grants_access() {
    let (server, handle, thread) = start(PolicyKind::Parallel);
    let (socket, vehicle) = client();

    let request = Message::RequestAccess {
        vehicle,
        lane: LaneSpec::new("east_in", "west_out"),
        eta: 1000,
        etc: 1005,
    };
    socket.send_to(&request.encode().unwrap(), server).unwrap();
    assert_eq!(receive(&socket), Message::GrantAccess { vehicle });

    handle.stop();
    thread.join().unwrap();
}
