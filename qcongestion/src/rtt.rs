use std::time::Duration;

pub(crate) const GRANULARITY: Duration = Duration::from_millis(1);

/// RTT estimation of a connection.
///
/// See [Section 5](https://www.rfc-editor.org/rfc/rfc9002.html#section-5)
/// of [RFC 9002](https://www.rfc-editor.org/rfc/rfc9002.html).
#[derive(Debug, Clone)]
pub struct Rtt {
    max_ack_delay: Duration,
    time_threshold: f64,
    has_sample: bool,
    latest_rtt: Duration,
    smoothed_rtt: Duration,
    rttvar: Duration,
    min_rtt: Duration,
}

impl Rtt {
    pub fn new(initial_rtt: Duration, max_ack_delay: Duration, time_threshold: f64) -> Self {
        Self {
            max_ack_delay,
            time_threshold,
            has_sample: false,
            latest_rtt: Duration::ZERO,
            smoothed_rtt: initial_rtt,
            rttvar: initial_rtt / 2,
            min_rtt: Duration::ZERO,
        }
    }

    /// Take a new sample.
    ///
    /// The ack delay reported by the peer is subtracted when plausible, and
    /// capped by the peer's max_ack_delay once the handshake is confirmed.
    pub fn update(
        &mut self,
        latest_rtt: Duration,
        mut ack_delay: Duration,
        is_handshake_confirmed: bool,
    ) {
        self.latest_rtt = latest_rtt;
        if !self.has_sample {
            self.has_sample = true;
            self.min_rtt = latest_rtt;
            self.smoothed_rtt = latest_rtt;
            self.rttvar = latest_rtt / 2;
            return;
        }

        // min_rtt ignores acknowledgment delay.
        self.min_rtt = self.min_rtt.min(latest_rtt);
        if is_handshake_confirmed {
            ack_delay = ack_delay.min(self.max_ack_delay);
        }
        let mut adjusted_rtt = latest_rtt;
        if latest_rtt >= self.min_rtt + ack_delay {
            adjusted_rtt = latest_rtt - ack_delay;
        }

        let abs_diff = self.smoothed_rtt.abs_diff(adjusted_rtt);
        self.rttvar = self.rttvar * 3 / 4 + abs_diff / 4;
        self.smoothed_rtt = self.smoothed_rtt * 7 / 8 + adjusted_rtt / 8;
    }

    pub fn set_max_ack_delay(&mut self, max_ack_delay: Duration) {
        self.max_ack_delay = max_ack_delay;
    }

    pub fn max_ack_delay(&self) -> Duration {
        self.max_ack_delay
    }

    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    pub fn rttvar(&self) -> Duration {
        self.rttvar
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    /// How long a packet may stay unacknowledged before it is lost, while
    /// newer packets are acknowledged.
    pub fn loss_delay(&self) -> Duration {
        (self.smoothed_rtt + self.rttvar * 4)
            .max(GRANULARITY)
            .mul_f64(self.time_threshold)
    }

    /// The probe timeout without max_ack_delay, doubled for every PTO
    /// that expired in a row.
    pub fn pto_base_duration(&self, pto_count: u32) -> Duration {
        (self.smoothed_rtt + (self.rttvar * 4).max(GRANULARITY)) * (1 << pto_count.min(16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rtt() -> Rtt {
        Rtt::new(Duration::from_millis(333), Duration::from_millis(25), 9.0 / 8.0)
    }

    #[test]
    fn test_first_sample() {
        let mut rtt = rtt();
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(333));
        rtt.update(Duration::from_millis(100), Duration::from_millis(10), false);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
        assert_eq!(rtt.rttvar(), Duration::from_millis(50));
        assert_eq!(rtt.min_rtt(), Duration::from_millis(100));
    }

    #[test]
    fn test_weighted_samples() {
        let mut rtt = rtt();
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        rtt.update(Duration::from_millis(180), Duration::ZERO, true);
        // 7/8 * 100 + 1/8 * 180
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(110));
        // 3/4 * 50 + 1/4 * 80
        assert_eq!(rtt.rttvar(), Duration::from_millis(57) + Duration::from_micros(500));
    }

    #[test]
    fn test_ack_delay_capped_after_handshake() {
        let mut rtt = rtt();
        rtt.update(Duration::from_millis(100), Duration::ZERO, true);
        // the 100ms delay is capped to the 25ms max_ack_delay
        rtt.update(Duration::from_millis(125), Duration::from_millis(100), true);
        assert_eq!(rtt.smoothed_rtt(), Duration::from_millis(100));
        assert_eq!(rtt.latest_rtt(), Duration::from_millis(125));
    }

    #[test]
    fn test_loss_delay_and_pto() {
        let mut rtt = rtt();
        rtt.update(Duration::from_millis(80), Duration::ZERO, true);
        // (80 + 4 * 40) * 9 / 8
        assert_eq!(rtt.loss_delay(), Duration::from_millis(270));
        assert_eq!(rtt.pto_base_duration(0), Duration::from_millis(240));
        assert_eq!(rtt.pto_base_duration(2), Duration::from_millis(960));
    }
}
