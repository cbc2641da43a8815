use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::device_resolver::{GENERIC_MANUFACTURER, VENDOR_MANUFACTURER};
use crate::testing::{vendor_reply, FakeTransport};

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn engine(transport: Arc<FakeTransport>) -> DiscoveryEngine {
    let config = ScanConfig {
        ports: vec![80, 554],
        passive_window: Duration::from_millis(10),
        udp_window: Duration::from_millis(10),
        ..Default::default()
    };
    // No HTTP ports: the fake network has no real servers behind it
    let resolver = ResolverConfig {
        http_ports: vec![],
        ..Default::default()
    };
    DiscoveryEngine::new(transport, config, resolver).unwrap()
}

fn request(range: &str) -> ScanRequest {
    ScanRequest {
        range: range.to_string(),
        ..Default::default()
    }
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<DiscoveryEvent>) -> Vec<DiscoveryEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_each_ip_reported_once_across_phases() {
    let transport = Arc::new(FakeTransport::new());
    transport.broadcast_reply(vendor_reply(
        ip("10.0.0.2"),
        "DevInfo",
        json!({"name": "Porch", "model": "RLC-510A", "UID": "UID-PORCH"}),
    ));
    transport.passive(PassiveProtocol::WsDiscovery, &["10.0.0.2", "10.0.0.3"]);
    transport.passive(PassiveProtocol::Ssdp, &["10.0.0.3"]);
    transport.open("10.0.0.2", &[554]);
    transport.open("10.0.0.3", &[554]);
    transport.open("10.0.0.5", &[554]);

    let engine = engine(Arc::clone(&transport));
    let mut rx = engine.subscribe();
    let summary = engine.run(request("10.0.0.0/29")).await.unwrap();

    let found: Vec<_> = summary.devices.iter().map(|d| (d.ip, d.source)).collect();
    assert_eq!(
        found,
        vec![
            (ip("10.0.0.2"), DiscoverySource::VendorBroadcast),
            (ip("10.0.0.3"), DiscoverySource::WsDiscovery),
            (ip("10.0.0.5"), DiscoverySource::AddressSweep),
        ]
    );

    let porch = &summary.devices[0];
    assert_eq!(porch.name.as_deref(), Some("Porch"));
    assert_eq!(porch.uid.as_deref(), Some("UID-PORCH"));
    assert_eq!(porch.manufacturer.as_deref(), Some(VENDOR_MANUFACTURER));
    assert_eq!(summary.devices[2].manufacturer.as_deref(), Some(GENERIC_MANUFACTURER));

    // Hosts found before the sweep are not probed again
    let probed: Vec<IpAddr> = transport.probes().iter().map(|a| a.ip()).collect();
    assert!(!probed.contains(&ip("10.0.0.2")));
    assert!(!probed.contains(&ip("10.0.0.3")));
    assert_eq!(probed.len(), 4 * 2);

    assert_eq!(summary.hosts_total, 6);
    assert_eq!(summary.hosts_checked, 6);
    assert!(!summary.cancelled);
    assert_eq!(engine.state(), EngineState::Completed);

    let device_events = drain(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, DiscoveryEvent::DeviceFound(_)))
        .count();
    assert_eq!(device_events, 3);
}

#[tokio::test]
async fn test_known_cameras_are_skipped() {
    let transport = Arc::new(FakeTransport::new());
    transport.broadcast_reply(vendor_reply(ip("10.0.0.1"), "Search", json!({"devName": "Known"})));
    transport.open("10.0.0.5", &[554]);
    transport.open("10.0.0.6", &[554]);

    let engine = engine(Arc::clone(&transport));
    let summary = engine
        .run(ScanRequest {
            range: "10.0.0.0/29".to_string(),
            known_urls: vec![
                "rtsp://admin:pw@10.0.0.5:554/h264Preview_01_main".to_string(),
                "rtsp://10.0.0.1/live".to_string(),
            ],
            ..Default::default()
        })
        .await
        .unwrap();

    let ips: Vec<IpAddr> = summary.devices.iter().map(|d| d.ip).collect();
    assert_eq!(ips, vec![ip("10.0.0.6")]);
    assert!(transport
        .probes()
        .iter()
        .all(|a| a.ip() != ip("10.0.0.5") && a.ip() != ip("10.0.0.1")));
    assert_eq!(summary.hosts_checked, 6);
}

#[tokio::test]
async fn test_host_ending_in_255_is_queried_directly() {
    let transport = Arc::new(FakeTransport::new());
    transport.open("10.0.1.255", &[554]);
    transport.unicast_reply(vendor_reply(ip("10.0.1.255"), "DevInfo", json!({"name": "Shed"})));

    let engine = engine(Arc::clone(&transport));
    let summary = engine.run(request("10.0.1.255")).await.unwrap();

    assert_eq!(transport.broadcasts(), vec![ip("255.255.255.255")]);
    assert_eq!(transport.udp_targets(), vec![ip("10.0.1.255")]);
    assert_eq!(summary.devices.len(), 1);
    assert_eq!(summary.devices[0].name.as_deref(), Some("Shed"));
    assert_eq!(summary.devices[0].manufacturer.as_deref(), Some(VENDOR_MANUFACTURER));
}

#[tokio::test]
async fn test_invalid_range_leaves_engine_usable() {
    let transport = Arc::new(FakeTransport::new());
    let engine = engine(Arc::clone(&transport));

    let err = engine.run(request("10.0.0.0/8")).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(engine.state(), EngineState::Idle);
    assert!(transport.udp_targets().is_empty());
    assert!(transport.broadcasts().is_empty());

    let summary = engine.run(request("10.0.0.9")).await.unwrap();
    assert_eq!(summary.hosts_total, 1);
    assert_eq!(engine.state(), EngineState::Completed);
}

#[tokio::test]
async fn test_cancel_stops_before_next_port() {
    let transport = Arc::new(FakeTransport::new());
    transport.broadcast_reply(vendor_reply(ip("10.0.0.200"), "DevInfo", json!({"name": "Yard"})));

    let engine = engine(Arc::clone(&transport));
    transport.cancel_after(3, engine.cancel_handle());
    let mut rx = engine.subscribe();

    let summary = engine.run(request("10.0.0.0/29")).await.unwrap();

    assert_eq!(
        transport.probes(),
        vec![
            SocketAddr::new(ip("10.0.0.1"), 80),
            SocketAddr::new(ip("10.0.0.1"), 554),
            SocketAddr::new(ip("10.0.0.2"), 80),
        ]
    );
    assert!(summary.cancelled);
    assert_eq!(summary.hosts_checked, 1);
    assert_eq!(summary.devices.len(), 1);
    assert_eq!(summary.devices[0].ip, ip("10.0.0.200"));
    assert_eq!(engine.state(), EngineState::Cancelled);

    let last = drain(&mut rx).pop();
    assert_eq!(last, Some(DiscoveryEvent::Complete { count: 1, cancelled: true }));
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let transport = Arc::new(FakeTransport::new());
    transport.open("10.0.0.4", &[80, 554]);

    let engine = engine(Arc::clone(&transport));
    let mut rx = engine.subscribe();
    engine.run(request("10.0.0.0/29")).await.unwrap();

    let events = drain(&mut rx);
    let percents: Vec<u8> = events
        .iter()
        .filter_map(|e| match e {
            DiscoveryEvent::Progress(p) => Some(p.percent),
            _ => None,
        })
        .collect();

    assert_eq!(percents.first(), Some(&5));
    assert_eq!(percents.last(), Some(&100));
    assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(
        events.last(),
        Some(&DiscoveryEvent::Complete { count: 1, cancelled: false })
    );

    let labels: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            DiscoveryEvent::Progress(p) => Some(p.current_host_label.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(labels[1], "10.0.0.1");
}

#[tokio::test]
async fn test_second_run_conflicts_while_running() {
    let transport = Arc::new(FakeTransport::new());
    transport.slow_probes(Duration::from_millis(20));

    let engine = Arc::new(engine(Arc::clone(&transport)));
    let first = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.run(request("10.0.0.0/29")).await })
    };

    while engine.state() != EngineState::Running {
        tokio::task::yield_now().await;
    }

    let err = engine.run(request("10.0.0.0/30")).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    engine.cancel();
    let summary = first.await.unwrap().unwrap();
    assert!(summary.cancelled);

    // Released once the first run ends
    assert!(engine.run(request("10.0.0.1")).await.is_ok());
}
