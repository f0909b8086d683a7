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

#![allow(unused_variables)]

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use crate::rtt::RttEstimator;
use crate::RecoveryConfig;
use crate::Result;
pub use bandwidth::Bandwidth;
pub use bandwidth_sampler::BandwidthSample;
pub use bandwidth_sampler::BandwidthSampler;
pub use bandwidth_sampler::SamplerStats;
pub use bbr::Bbr;
pub use bbr::BbrConfig;
pub use bbr::BbrDebugState;
pub use bbr::BbrMode;
pub use bbr::ConnectionOption;
pub use bbr::CwndHeadroom;
pub use bbr::RecoveryState;
pub use windowed_filter::WindowedMaxFilter;

/// A packet acknowledged in a congestion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AckedPacket {
    /// Packet number.
    pub pkt_num: u64,

    /// Size in bytes when the packet was sent.
    pub sent_size: u64,
}

/// A packet declared lost in a congestion event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostPacket {
    /// Packet number.
    pub pkt_num: u64,

    /// Size in bytes when the packet was sent.
    pub sent_size: u64,
}

/// Congestion control statistics.
#[derive(Debug, Default, Clone)]
pub struct CongestionStats {
    /// Bytes in flight.
    pub bytes_in_flight: u64,

    /// Total bytes sent in slow start.
    pub bytes_sent_in_slow_start: u64,

    /// Total bytes acked in slow start.
    pub bytes_acked_in_slow_start: u64,

    /// Total bytes lost in slow start.
    pub bytes_lost_in_slow_start: u64,

    /// Total bytes sent.
    pub bytes_sent_in_total: u64,

    /// Total bytes acked.
    pub bytes_acked_in_total: u64,

    /// Total bytes lost.
    pub bytes_lost_in_total: u64,
}

/// Congestion control interfaces driven by the loss detection of a path.
pub trait CongestionController {
    /// Name of congestion control algorithm.
    fn name(&self) -> &str;

    /// Callback after packet was sent out. `bytes_in_flight` excludes the
    /// packet itself.
    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        pkt_num: u64,
        bytes: u64,
        has_retransmittable_data: bool,
    );

    /// Congestion event carrying the packets acked and lost by one ack
    /// frame. `acked` is in ascending packet number order.
    #[allow(clippy::too_many_arguments)]
    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        prior_in_flight: u64,
        bytes_in_flight: u64,
        event_time: Instant,
        acked: &[AckedPacket],
        lost: &[LostPacket],
        least_unacked: u64,
        rtt: &RttEstimator,
    );

    /// Callback when the sender has no more data to send.
    fn on_app_limited(&mut self, bytes_in_flight: u64) {}

    /// Check if the congestion window allows sending more data.
    fn can_send(&self, bytes_in_flight: u64) -> bool {
        bytes_in_flight < self.congestion_window()
    }

    /// Check if in slow start.
    fn in_slow_start(&self) -> bool {
        false
    }

    /// Check if in recovery mode.
    fn in_recovery(&self) -> bool {
        false
    }

    /// Check if the sender is probing for more bandwidth.
    fn is_probing_for_more_bandwidth(&self) -> bool {
        false
    }

    /// Current congestion window.
    fn congestion_window(&self) -> u64;

    /// Current pacing rate estimated by Congestion Control Algorithm (CCA).
    fn pacing_rate(&self, bytes_in_flight: u64) -> Bandwidth;

    /// Current bandwidth estimate.
    fn bandwidth_estimate(&self) -> Bandwidth;

    /// Seed the model with externally known network parameters, e.g. those
    /// cached from a previous connection.
    fn adjust_network_parameters(&mut self, bandwidth: Bandwidth, rtt: Duration) {}

    /// Initial congestion window.
    fn initial_window(&self) -> u64;

    /// Minimal congestion window.
    fn minimal_window(&self) -> u64;

    /// Congestion stats.
    fn stats(&self) -> &CongestionStats;
}

impl fmt::Debug for dyn CongestionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "congestion controller {}.", self.name())
    }
}

/// Build a congestion controller.
pub fn build_congestion_controller(conf: &RecoveryConfig) -> Result<Box<dyn CongestionController>> {
    let max_datagram_size: u64 = conf.max_datagram_size as u64;
    let min_cwnd = conf.min_congestion_window.saturating_mul(max_datagram_size);
    let initial_cwnd = conf
        .initial_congestion_window
        .saturating_mul(max_datagram_size);
    let max_cwnd = conf.max_congestion_window.saturating_mul(max_datagram_size);

    let mut bbr_conf = BbrConfig::new(
        min_cwnd,
        initial_cwnd,
        Some(conf.initial_rtt),
        max_datagram_size,
    );
    bbr_conf.set_max_cwnd(max_cwnd);
    bbr_conf.apply_connection_options(&conf.connection_options);
    bbr_conf.validate()?;

    Ok(Box::new(Bbr::new(bbr_conf)))
}


mod bandwidth;
mod bandwidth_sampler;
mod bbr;
mod windowed_filter;
