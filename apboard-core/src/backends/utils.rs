use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

/// Calls `check` every `interval` until it yields a value or `timeout` elapses.
///
/// The deadline also bounds each check call, so a hung check cannot stretch
/// the wait. Returns `None` on timeout.
pub async fn poll_until<T, F, Fut>(timeout: Duration, interval: Duration, mut check: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        match timeout_at(deadline, check()).await {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(_) => return None,
        }
        let now = Instant::now();
        if now >= deadline {
            return None;
        }
        sleep(interval.min(deadline - now)).await;
    }
}

/// Converts a 0-100 signal quality (as nmcli reports it) to approximate dBm.
pub fn rssi_from_signal_percent(percent: u8) -> i16 {
    i16::from(percent.min(100)) / 2 - 100
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn returns_as_soon_as_check_succeeds() {
        let calls = Cell::new(0);
        let start = Instant::now();
        let got = poll_until(Duration::from_secs(10), Duration::from_millis(500), || {
            calls.set(calls.get() + 1);
            let n = calls.get();
            async move { (n == 3).then_some("10.0.0.5") }
        })
        .await;

        assert_eq!(got, Some("10.0.0.5"));
        assert_eq!(calls.get(), 3);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_at_the_deadline() {
        let start = Instant::now();
        let got: Option<()> = poll_until(Duration::from_secs(10), Duration::from_millis(300), || async { None }).await;

        assert_eq!(got, None);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_bounds_a_hung_check() {
        let start = Instant::now();
        let got: Option<()> = poll_until(Duration::from_secs(2), Duration::from_millis(100), || async {
            sleep(Duration::from_secs(3600)).await;
            Some(())
        })
        .await;

        assert_eq!(got, None);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[test]
    fn converts_signal_quality_to_dbm() {
        assert_eq!(rssi_from_signal_percent(100), -50);
        assert_eq!(rssi_from_signal_percent(0), -100);
        assert_eq!(rssi_from_signal_percent(70), -65);
        assert_eq!(rssi_from_signal_percent(250), -50);
    }
}
