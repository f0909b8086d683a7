// Copyright (c) 2023 The TQUIC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! BBR congestion control for QUIC transports.
//!
//! This crate implements the bandwidth model and the control loop of the
//! BBR (Bottleneck Bandwidth and Round-trip propagation time) congestion
//! control algorithm, as deployed with QUIC.
//!
//! ## Components
//!
//! * **BandwidthSampler**: tracks packets in flight and produces a delivery
//!   rate sample for each acknowledged packet.
//! * **WindowedMaxFilter**: a windowed maximum over recent round trips,
//!   which yields the bottleneck bandwidth estimate.
//! * **Bbr**: the controller, which drives the pacing rate and the
//!   congestion window through the Startup, Drain, ProbeBW and ProbeRTT
//!   states, with a packet conservation based loss recovery.
//!
//! ## Get started
//!
//! The controller is driven through the [`CongestionController`] trait by
//! the loss detection of a transport:
//!
//! ```
//! use std::time::Instant;
//! use tquic_bbr::{AckedPacket, CongestionController, Config, RttEstimator};
//!
//! let mut conf = Config::new();
//! conf.set_connection_options("1RTT,BBRR")?;
//! let mut cc = tquic_bbr::build_congestion_controller(&conf.recovery)?;
//! let mut rtt = RttEstimator::new(conf.recovery.initial_rtt);
//!
//! let sent_time = Instant::now();
//! cc.on_packet_sent(sent_time, 0, 1, 1200, true);
//!
//! let ack_time = Instant::now();
//! rtt.update(std::time::Duration::ZERO, ack_time - sent_time);
//! let acked = [AckedPacket { pkt_num: 1, sent_size: 1200 }];
//! cc.on_congestion_event(true, 1200, 0, ack_time, &acked, &[], 2, &rtt);
//! assert!(cc.can_send(0));
//! # Ok::<(), tquic_bbr::error::Error>(())
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

use std::cmp;
use std::time::Duration;

use log::*;

/// Default outgoing udp datagram payloads size.
pub const DEFAULT_SEND_UDP_PAYLOAD_SIZE: usize = 1200;

/// The RECOMMENDED value of the timer granularity is 1 millisecond.
/// See RFC 9002 Section 6.1
pub const TIMER_GRANULARITY: Duration = Duration::from_millis(1);

/// Resumed connections over the same network MAY use the previous connection's
/// final smoothed RTT value as the resumed connection's initial RTT. When no
/// previous RTT is available, the initial RTT SHOULD be set to 333 milliseconds.
/// See RFC 9002 Section 6.2.2
pub const INITIAL_RTT: Duration = Duration::from_millis(333);

/// Default minimal congestion window in packets.
const DEFAULT_MIN_CONGESTION_WINDOW: u64 = 4;

/// Default initial congestion window in packets.
/// See RFC 9002 Section 7.2
const DEFAULT_INITIAL_CONGESTION_WINDOW: u64 = 10;

/// Default maximal congestion window in packets.
const DEFAULT_MAX_CONGESTION_WINDOW: u64 = 2000;

/// A specialized [`Result`] type for congestion control operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// Configurations of the congestion controller.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Configurations about loss recovery and congestion control.
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Create default configuration.
    ///
    /// The configuration may be customized by calling related set methods.
    ///
    /// ## Examples:
    ///
    /// ```
    /// let mut conf = tquic_bbr::Config::new();
    /// conf.set_initial_rtt(100);
    /// conf.set_initial_congestion_window(32);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum outgoing UDP payload size in bytes.
    /// The default value is `1200`.
    pub fn set_max_datagram_size(&mut self, v: usize) {
        self.recovery.max_datagram_size = cmp::max(v, DEFAULT_SEND_UDP_PAYLOAD_SIZE);
    }

    /// Set the initial congestion window in packets.
    /// The default value is 10.
    pub fn set_initial_congestion_window(&mut self, packets: u64) {
        self.recovery.initial_congestion_window = packets;
    }

    /// Set the minimal congestion window in packets.
    /// The default value is 4.
    pub fn set_min_congestion_window(&mut self, packets: u64) {
        self.recovery.min_congestion_window = packets
    }

    /// Set the maximal congestion window in packets.
    /// The default value is 2000.
    pub fn set_max_congestion_window(&mut self, packets: u64) {
        self.recovery.max_congestion_window = packets
    }

    /// Set the initial RTT in milliseconds. The default value is 333ms.
    ///
    /// The configuration should be changed with caution. Setting a value less
    /// than the default will cause the pacing rate of the first flight to be
    /// more aggressive.
    pub fn set_initial_rtt(&mut self, millis: u64) {
        self.recovery.initial_rtt = cmp::max(Duration::from_millis(millis), TIMER_GRANULARITY);
    }

    /// Set the connection options, a list of tags separated by commas or
    /// whitespaces, such as "1RTT,BBRR".
    ///
    /// The configuration is left unchanged if any tag is unknown.
    pub fn set_connection_options(&mut self, tags: &str) -> Result<()> {
        let options = ConnectionOption::parse_list(tags).map_err(|e| {
            warn!("invalid connection options {:?}: {}", tags, e);
            e
        })?;
        self.recovery.connection_options = options;
        Ok(())
    }
}

/// Configurations about loss recovery and congestion control.
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// The maximum size of outgoing UDP payloads.
    pub max_datagram_size: usize,

    /// The minimal congestion window in packets.
    pub min_congestion_window: u64,

    /// The initial congestion window in packets.
    /// Endpoints SHOULD use an initial congestion window of ten times the
    /// maximum datagram size (max_datagram_size), while limiting the window to
    /// the larger of 14,720 bytes or twice the maximum datagram size.
    /// See RFC 9002 Section 7.2
    pub initial_congestion_window: u64,

    /// The maximal congestion window in packets.
    pub max_congestion_window: u64,

    /// The initial rtt, used before real rtt is estimated.
    pub initial_rtt: Duration,

    /// Negotiated connection options.
    pub connection_options: Vec<ConnectionOption>,
}

impl Default for RecoveryConfig {
    fn default() -> RecoveryConfig {
        RecoveryConfig {
            max_datagram_size: DEFAULT_SEND_UDP_PAYLOAD_SIZE,
            min_congestion_window: DEFAULT_MIN_CONGESTION_WINDOW,
            initial_congestion_window: DEFAULT_INITIAL_CONGESTION_WINDOW,
            max_congestion_window: DEFAULT_MAX_CONGESTION_WINDOW,
            initial_rtt: INITIAL_RTT,
            connection_options: Vec::new(),
        }
    }
}

pub use crate::congestion_control::build_congestion_controller;
pub use crate::congestion_control::AckedPacket;
pub use crate::congestion_control::Bandwidth;
pub use crate::congestion_control::BandwidthSample;
pub use crate::congestion_control::BandwidthSampler;
pub use crate::congestion_control::Bbr;
pub use crate::congestion_control::BbrConfig;
pub use crate::congestion_control::BbrDebugState;
pub use crate::congestion_control::BbrMode;
pub use crate::congestion_control::CongestionController;
pub use crate::congestion_control::CongestionStats;
pub use crate::congestion_control::ConnectionOption;
pub use crate::congestion_control::CwndHeadroom;
pub use crate::congestion_control::LostPacket;
pub use crate::congestion_control::RecoveryState;
pub use crate::congestion_control::SamplerStats;
pub use crate::congestion_control::WindowedMaxFilter;
pub use crate::error::Error;
pub use crate::rtt::RttEstimator;

#[cfg(test)]
mod tests {
    use super::*;

    #[ctor::ctor]
    fn init() {
        env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .format_timestamp_millis()
            .is_test(true)
            .init();
    }

    #[test]
    fn initial_rtt() {
        let mut config = Config::new();

        config.set_initial_rtt(0);
        assert_eq!(config.recovery.initial_rtt, TIMER_GRANULARITY);

        config.set_initial_rtt(100);
        assert_eq!(config.recovery.initial_rtt, Duration::from_millis(100));
    }

    #[test]
    fn congestion_windows() {
        let mut config = Config::new();
        assert_eq!(config.recovery.min_congestion_window, 4);
        assert_eq!(config.recovery.initial_congestion_window, 10);
        assert_eq!(config.recovery.max_congestion_window, 2000);

        config.set_min_congestion_window(2);
        config.set_initial_congestion_window(32);
        config.set_max_congestion_window(100);
        assert_eq!(config.recovery.min_congestion_window, 2);
        assert_eq!(config.recovery.initial_congestion_window, 32);
        assert_eq!(config.recovery.max_congestion_window, 100);

        config.set_max_datagram_size(1000);
        assert_eq!(config.recovery.max_datagram_size, 1200);
        config.set_max_datagram_size(1350);
        assert_eq!(config.recovery.max_datagram_size, 1350);
    }

    #[test]
    fn connection_options() -> Result<()> {
        let mut config = Config::new();

        config.set_connection_options("2RTT, BBR1")?;
        assert_eq!(
            config.recovery.connection_options,
            vec![
                ConnectionOption::StartupTwoRtts,
                ConnectionOption::AckAggregationOneAndHalf
            ]
        );

        // Unknown tags leave the options unchanged.
        assert_eq!(
            config.set_connection_options("LRTT,ABCD"),
            Err(Error::UnknownConnectionOption("ABCD".into()))
        );
        assert_eq!(config.recovery.connection_options.len(), 2);

        config.set_connection_options("")?;
        assert!(config.recovery.connection_options.is_empty());
        Ok(())
    }
}

#[path = "congestion_control/congestion_control.rs"]
pub mod congestion_control;

#[path = "connection/rtt.rs"]
pub mod rtt;

pub mod error;
