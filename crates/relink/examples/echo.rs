//! Single-process echo demo over the loopback engine.
//!
//! Run:
//! - cargo run -p relink --example echo
//! - RUST_LOG=relink_host=trace cargo run -p relink --example echo

use relink::{Address, Delivery, Host, HostConfig, LoopbackTransport, TransportRef};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let transport: TransportRef = LoopbackTransport::new_shared();
    let address = Address::new(0x7F00_0001, 9000);

    let mut server = Host::new(transport.clone(), HostConfig::bound(address))?;
    let mut client = Host::new(transport, HostConfig::default())?;
    println!("echo server listening on {}", address);

    let mut accepted = server.accept()?;
    let (client_peer, mut connecting) = client.connect(address, 2, 0)?;

    client.run();
    server.run();

    let connected = connecting.try_take().expect("connect did not resolve")?;
    println!("[client] connected, state={:?}", connected.state());
    let server_peer = accepted.try_take().expect("accept did not resolve")?;
    println!("[server] accepted, state={:?}", server_peer.state());

    for message in ["hello", "from", "relink"] {
        client_peer.send(0, message.as_bytes(), Delivery::Reliable)?;
        server.run();

        let mut receiving = server_peer.receive()?;
        let packet = receiving.try_take().expect("receive did not resolve")?;
        let text = String::from_utf8_lossy(&packet.bytes()).into_owned();
        println!("[server] got \"{}\", echoing", text);

        server_peer.send(0, &packet.bytes(), Delivery::Reliable)?;
        client.run();

        let mut receiving = client_peer.receive()?;
        let echo = receiving.try_take().expect("echo did not resolve")?;
        println!("[client] echo \"{}\"", String::from_utf8_lossy(&echo.bytes()));
    }

    let mut disconnecting = client_peer.disconnect(42)?;
    server.run();
    client.run();
    match disconnecting.try_take() {
        Some(Ok(data)) => println!("[client] disconnected, data={}", data),
        other => println!("[client] disconnect did not resolve cleanly: {:?}", other),
    }

    client.close();
    server.close();
    Ok(())
}
