use std::net::Ipv4Addr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use waypoint::cancel::Cancel;
use waypoint::context::QueryContext;
use waypoint::dns::{DnsPacket, DnsResourceRecord, DnsResourceType, RData, Rcode};
use waypoint::graceful_shutdown::GracefulShutdown;
use waypoint::pipeline::{Action, ChainNode, Executable};
use waypoint::server::{ServerContext, udp};

struct StaticAnswer;

#[async_trait::async_trait]
impl Executable for StaticAnswer {
    async fn execute(&self, ctx: &mut QueryContext, _cancel: &Cancel) -> waypoint::Result<()> {
        let mut response = ctx.request.create_response(Rcode::NOERROR);
        response.answers.push(DnsResourceRecord {
            labels: ctx.request.questions[0].labels.clone(),
            rtype: DnsResourceType::A,
            rclass: waypoint::dns::DnsResourceClass::IN,
            ttl: 60,
            rdata: RData::A(Ipv4Addr::new(127, 0, 0, 1)),
        });
        response.update_counts();
        ctx.set_response(response);
        Ok(())
    }
}

async fn spawn_test_server() -> std::net::SocketAddr {
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let chain = Arc::new(vec![ChainNode::unconditional(Action::Executable(Arc::new(
        StaticAnswer,
    )))]);
    let shutdown = Arc::new(GracefulShutdown::new());
    let ctx = Arc::new(ServerContext::new(chain, shutdown));

    tokio::spawn(async move {
        udp::run(socket, ctx).await;
    });

    addr
}

#[tokio::test]
async fn answers_a_query_over_udp() {
    let server_addr = spawn_test_server().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(server_addr).await.unwrap();

    let query = DnsPacket::new_query(42, "example.com", DnsResourceType::A);
    client.send(&query.to_wire().unwrap()).await.unwrap();

    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(std::time::Duration::from_secs(2), client.recv(&mut buf))
        .await
        .expect("response within timeout")
        .unwrap();

    let response = DnsPacket::from_wire(&buf[..len]).unwrap();
    assert_eq!(response.header.id, 42);
    assert!(response.header.qr);
    assert_eq!(response.header.rcode, Rcode::NOERROR);
    assert_eq!(response.answers.len(), 1);
}

#[tokio::test]
async fn unparsable_datagrams_are_dropped_without_crashing_the_listener() {
    let server_addr = spawn_test_server().await;

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.connect(server_addr).await.unwrap();

    client.send(&[0xff, 0x00]).await.unwrap();

    let query = DnsPacket::new_query(7, "still-alive.example.com", DnsResourceType::A);
    client.send(&query.to_wire().unwrap()).await.unwrap();

    let mut buf = [0u8; 512];
    let len = tokio::time::timeout(std::time::Duration::from_secs(2), client.recv(&mut buf))
        .await
        .expect("response within timeout")
        .unwrap();
    let response = DnsPacket::from_wire(&buf[..len]).unwrap();
    assert_eq!(response.header.id, 7);
}
