//! Wake heuristics for sleeping battery cameras

use std::net::{IpAddr, SocketAddr};
use tokio::time::{sleep, Instant};

use super::types::SessionConfig;
use crate::network_probe::Transport;

/// Send wake bursts until the RTSP port answers or the attempts run out
///
/// Rounds start `wake_interval` apart; a round that overruns the interval is
/// followed immediately by the next. Returns whether reachability was
/// confirmed. Callers connect either way.
pub(crate) async fn wake_until_reachable(
    transport: &dyn Transport,
    host: IpAddr,
    rtsp_port: u16,
    uid: Option<&str>,
    config: &SessionConfig,
) -> bool {
    let target = SocketAddr::new(host, rtsp_port);

    for attempt in 1..=config.wake_attempts {
        let round_start = Instant::now();
        transport.wake_burst(host, uid, &config.wake_ports).await;

        for _ in 0..config.wake_polls {
            if transport.tcp_probe(target, config.wake_poll_timeout).await.is_open() {
                tracing::debug!(host = %host, attempt = attempt, "Camera awake");
                return true;
            }
        }

        if attempt < config.wake_attempts {
            if let Some(remaining) = config.wake_interval.checked_sub(round_start.elapsed()) {
                sleep(remaining).await;
            }
        }
    }

    tracing::debug!(host = %host, attempts = config.wake_attempts, "Wake not confirmed, connecting anyway");
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network_probe::ProbeOutcome;
    use crate::testing::FakeTransport;
    use std::time::Duration;

    fn fast_config() -> SessionConfig {
        SessionConfig {
            wake_attempts: 3,
            wake_interval: Duration::from_millis(5),
            wake_polls: 2,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stops_on_first_open_poll() {
        let transport = FakeTransport::new();
        let host: IpAddr = "10.0.0.5".parse().unwrap();
        transport.set_tcp(SocketAddr::new(host, 554), ProbeOutcome::Ok);

        let awake = wake_until_reachable(&transport, host, 554, Some("UID1"), &fast_config()).await;
        assert!(awake);
        assert_eq!(transport.wakes(), vec![(host, Some("UID1".to_string()))]);
        assert_eq!(transport.probes().len(), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_all_attempts() {
        let transport = FakeTransport::new();
        let host: IpAddr = "10.0.0.6".parse().unwrap();

        let awake = wake_until_reachable(&transport, host, 554, None, &fast_config()).await;
        assert!(!awake);
        assert_eq!(transport.wakes().len(), 3);
        assert_eq!(transport.probes().len(), 6);
    }

    #[tokio::test]
    async fn test_rounds_paced_by_interval() {
        let transport = FakeTransport::new();
        transport.slow_wakes(Duration::from_millis(120));
        transport.slow_probes(Duration::from_millis(30));
        let host: IpAddr = "10.0.0.7".parse().unwrap();
        let config = SessionConfig {
            wake_attempts: 4,
            wake_interval: Duration::from_millis(200),
            wake_polls: 2,
            ..Default::default()
        };

        let start = std::time::Instant::now();
        let awake = wake_until_reachable(&transport, host, 554, None, &config).await;
        let elapsed = start.elapsed();

        assert!(!awake);
        assert_eq!(transport.wakes().len(), 4);
        // Three full intervals plus one final round of 180ms work
        assert!(elapsed >= Duration::from_millis(780));
        assert!(elapsed < Duration::from_millis(1100));
    }

    #[test]
    fn test_default_round_fits_interval() {
        let config = SessionConfig::default();
        let polls = config.wake_poll_timeout * config.wake_polls;
        let burst = crate::network_probe::WAKE_SEND_GAP * (crate::network_probe::WAKE_REPEATS as u32 - 1);
        assert!(polls + burst <= config.wake_interval);
        assert!(config.wake_interval * config.wake_attempts <= Duration::from_secs(10));
    }
}
