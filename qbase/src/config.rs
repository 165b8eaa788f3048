use std::time::Duration;

use derive_builder::Builder;
use getset::CopyGetters;
use thiserror::Error;

/// The limits an endpoint announces to its peer during the handshake.
///
/// The crypto layer carries them, the engine only reads the peer's copy once
/// the handshake reaches the application epoch.
#[derive(Builder, CopyGetters, Debug, Clone, Copy, PartialEq, Eq)]
#[builder(default, setter(into))]
pub struct Parameters {
    #[getset(get_copy = "pub")]
    max_idle_timeout: Duration,
    #[getset(get_copy = "pub")]
    max_udp_payload_size: u64,
    #[getset(get_copy = "pub")]
    initial_max_data: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_bidi_local: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_bidi_remote: u64,
    #[getset(get_copy = "pub")]
    initial_max_stream_data_uni: u64,
    #[getset(get_copy = "pub")]
    initial_max_streams_bidi: u64,
    #[getset(get_copy = "pub")]
    initial_max_streams_uni: u64,
    #[getset(get_copy = "pub")]
    max_ack_delay: Duration,
}

impl Default for Parameters {
    fn default() -> Self {
        Config::default().parameters()
    }
}

impl Parameters {
    pub fn builder() -> ParametersBuilder {
        ParametersBuilder::default()
    }
}

/// Invalid configuration values, reported by [`ConfigBuilder::build`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("max datagram size {0} is below the minimum of 1200 bytes")]
    DatagramTooSmall(usize),
    #[error("{0} must be at least {1}")]
    TooSmall(&'static str, u64),
    #[error("time threshold {0} must be at least 1.0")]
    TimeThreshold(String),
    #[error("incomplete config: {0}")]
    Incomplete(String),
}

/// The immutable configuration of one connection.
///
/// ```
/// use std::time::Duration;
/// use qbase::config::Config;
///
/// let config = Config::builder()
///     .initial_max_streams_bidi(8u64)
///     .idle_timeout(Duration::from_secs(10))
///     .build()
///     .unwrap();
/// assert_eq!(config.initial_max_streams_bidi(), 8);
/// assert_eq!(config.packet_threshold(), 3);
/// ```
#[derive(Builder, CopyGetters, Debug, Clone, PartialEq)]
#[builder(
    default,
    setter(into),
    build_fn(private, name = "fallible_build")
)]
#[getset(get_copy = "pub")]
pub struct Config {
    /// The largest datagram the engine produces.
    max_datagram_size: usize,
    /// Connection receive window at start.
    initial_max_data: u64,
    /// Receive window of streams we open.
    initial_max_stream_data_bidi_local: u64,
    /// Receive window of bidirectional streams the peer opens.
    initial_max_stream_data_bidi_remote: u64,
    /// Receive window of unidirectional streams the peer opens.
    initial_max_stream_data_uni: u64,
    /// Bidirectional streams the peer may open concurrently.
    initial_max_streams_bidi: u64,
    /// Unidirectional streams the peer may open concurrently.
    initial_max_streams_uni: u64,
    /// Upper bound of the connection receive window when auto-tuning.
    max_connection_window: u64,
    /// Upper bound of a stream receive window when auto-tuning.
    max_stream_window: u64,
    /// How long an ACK may be delayed after an ack-eliciting packet.
    max_ack_delay: Duration,
    /// Ack-eliciting packets received before an ACK is sent immediately.
    ack_eliciting_threshold: u64,
    /// The most ranges one ACK frame carries; older ranges are dropped.
    ack_range_cap: usize,
    /// Reordering threshold in packets for loss detection.
    packet_threshold: u64,
    /// Multiplier of the RTT for time threshold loss detection.
    time_threshold: f64,
    /// The connection closes silently after this much inactivity.
    idle_timeout: Duration,
    /// Bytes a stream buffers for sending before writers block.
    send_buffer_capacity: usize,
    /// The RTT assumed before the first sample.
    initial_rtt: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_datagram_size: 1200,
            initial_max_data: 1 << 20,
            initial_max_stream_data_bidi_local: 1 << 18,
            initial_max_stream_data_bidi_remote: 1 << 18,
            initial_max_stream_data_uni: 1 << 18,
            initial_max_streams_bidi: 100,
            initial_max_streams_uni: 100,
            max_connection_window: 16 << 20,
            max_stream_window: 6 << 20,
            max_ack_delay: Duration::from_millis(25),
            ack_eliciting_threshold: 2,
            ack_range_cap: 32,
            packet_threshold: 3,
            time_threshold: 9.0 / 8.0,
            idle_timeout: Duration::from_secs(30),
            send_buffer_capacity: 1 << 18,
            initial_rtt: Duration::from_millis(333),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// The limits this endpoint announces to its peer.
    pub fn parameters(&self) -> Parameters {
        Parameters {
            max_idle_timeout: self.idle_timeout,
            max_udp_payload_size: self.max_datagram_size as u64,
            initial_max_data: self.initial_max_data,
            initial_max_stream_data_bidi_local: self.initial_max_stream_data_bidi_local,
            initial_max_stream_data_bidi_remote: self.initial_max_stream_data_bidi_remote,
            initial_max_stream_data_uni: self.initial_max_stream_data_uni,
            initial_max_streams_bidi: self.initial_max_streams_bidi,
            initial_max_streams_uni: self.initial_max_streams_uni,
            max_ack_delay: self.max_ack_delay,
        }
    }
}

impl ConfigBuilder {
    /// Build the configuration, checking the values are usable.
    pub fn build(&self) -> Result<Config, ConfigError> {
        let config = self
            .fallible_build()
            .map_err(|e| ConfigError::Incomplete(e.to_string()))?;
        if config.max_datagram_size < 1200 {
            return Err(ConfigError::DatagramTooSmall(config.max_datagram_size));
        }
        if config.packet_threshold < 3 {
            return Err(ConfigError::TooSmall("packet threshold", 3));
        }
        if config.ack_range_cap < 1 {
            return Err(ConfigError::TooSmall("ack range cap", 1));
        }
        if config.ack_eliciting_threshold < 1 {
            return Err(ConfigError::TooSmall("ack eliciting threshold", 1));
        }
        if config.send_buffer_capacity < 1 {
            return Err(ConfigError::TooSmall("send buffer capacity", 1));
        }
        if config.time_threshold.is_nan() || config.time_threshold < 1.0 {
            return Err(ConfigError::TimeThreshold(config.time_threshold.to_string()));
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_datagram_size(), 1200);
        assert_eq!(config.packet_threshold(), 3);
        assert_eq!(config.time_threshold(), 1.125);
        assert_eq!(config.ack_range_cap(), 32);
    }

    #[test]
    fn test_invalid_config() {
        assert_eq!(
            Config::builder().max_datagram_size(1000usize).build(),
            Err(ConfigError::DatagramTooSmall(1000))
        );
        assert!(matches!(
            Config::builder().packet_threshold(1u64).build(),
            Err(ConfigError::TooSmall(..))
        ));
        assert!(matches!(
            Config::builder().time_threshold(0.5).build(),
            Err(ConfigError::TimeThreshold(_))
        ));
    }

    #[test]
    fn test_parameters() {
        let config = Config::builder()
            .initial_max_data(4096u64)
            .initial_max_streams_uni(3u64)
            .build()
            .unwrap();
        let params = config.parameters();
        assert_eq!(params.initial_max_data(), 4096);
        assert_eq!(params.initial_max_streams_uni(), 3);
        assert_eq!(params.max_ack_delay(), config.max_ack_delay());

        let params = Parameters::builder()
            .initial_max_data(1u64)
            .build()
            .unwrap();
        assert_eq!(params.initial_max_data(), 1);
        assert_eq!(params.initial_max_streams_bidi(), 100);
    }
}
