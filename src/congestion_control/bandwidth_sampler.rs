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

//! Bandwidth sampler, which turns packet send and ack events into delivery
//! rate samples.
//!
//! Every sample is computed from two rates over the lifetime of a packet:
//!  * the send rate, between the send time of the packet acknowledged most
//!    recently before this packet was sent, and the send time of this packet;
//!  * the ack rate, between the ack time of that same earlier packet and the
//!    ack time of this packet.
//!
//! The estimate is the lower of the two, since a sender can not be acked
//! faster than it sends, and a receiver can not receive faster than the
//! bottleneck delivers.

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use log::*;

use super::Bandwidth;

/// Maximum number of packets tracked simultaneously. Exceeding it is
/// reported but not fatal.
pub(crate) const MAX_TRACKED_PACKETS: u64 = 10_000;

/// A delivery rate observation produced for one acknowledged packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BandwidthSample {
    /// The estimated delivery rate, zero if no estimate is available.
    pub bandwidth: Bandwidth,

    /// Time between sending and acknowledging the packet, zero if unknown.
    pub rtt: Duration,

    /// Whether the connection was app-limited when the packet was sent.
    pub is_app_limited: bool,
}

impl BandwidthSample {
    /// An empty sample carries neither a bandwidth nor an rtt.
    pub fn is_empty(&self) -> bool {
        self.bandwidth.is_zero() && self.rtt.is_zero()
    }
}

/// Counters of internal anomalies. They indicate a caller that violates the
/// event ordering contract, and never stop the sampler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Packets sent more than `MAX_TRACKED_PACKETS` above the previous
    /// largest tracked packet.
    pub tracked_packets_exceeded: u64,

    /// Packets sent with a number not above the last tracked one.
    pub out_of_order_packets: u64,

    /// Acks observed no later than the ack that anchors their sample.
    pub ack_time_anomalies: u64,
}

/// Connection state snapshot taken when a packet is sent.
#[derive(Debug, Clone)]
struct SentPacketState {
    sent_time: Instant,

    size: u64,

    /// Total bytes sent up to and including this packet.
    total_bytes_sent: u64,

    total_bytes_sent_at_last_acked_packet: u64,

    last_acked_packet_sent_time: Option<Instant>,

    last_acked_packet_ack_time: Option<Instant>,

    total_bytes_acked_at_last_acked_packet: u64,

    is_app_limited: bool,
}

/// Packet states keyed by increasing packet numbers.
///
/// Removed entries leave a hole which is reclaimed once it reaches the
/// front, so lookups stay a binary search over a contiguous deque.
#[derive(Debug, Default)]
struct SentPacketMap {
    entries: VecDeque<(u64, Option<SentPacketState>)>,

    /// Number of entries that still hold a state.
    live: usize,
}

impl SentPacketMap {
    fn len(&self) -> usize {
        self.live
    }

    fn last_packet(&self) -> Option<u64> {
        self.entries.back().map(|e| e.0)
    }

    /// Insert a state, returns false if the packet number does not extend
    /// the map.
    fn insert(&mut self, pkt_num: u64, state: SentPacketState) -> bool {
        if matches!(self.last_packet(), Some(last) if pkt_num <= last) {
            return false;
        }
        self.entries.push_back((pkt_num, Some(state)));
        self.live += 1;
        true
    }

    fn take(&mut self, pkt_num: u64) -> Option<SentPacketState> {
        let idx = self.entries.binary_search_by_key(&pkt_num, |e| e.0).ok()?;
        let state = self.entries[idx].1.take()?;
        self.live -= 1;
        self.trim_front(0);
        Some(state)
    }

    /// Drop every entry below `least_unacked`, and any hole at the front.
    fn trim_front(&mut self, least_unacked: u64) {
        while let Some((pkt_num, state)) = self.entries.front() {
            if *pkt_num >= least_unacked && state.is_some() {
                break;
            }
            if state.is_some() {
                self.live -= 1;
            }
            self.entries.pop_front();
        }
    }
}

/// Bandwidth sampler, see the module documentation.
#[derive(Debug, Default)]
pub struct BandwidthSampler {
    /// Total bytes of retransmittable packets sent.
    total_bytes_sent: u64,

    /// Total bytes of packets acknowledged.
    total_bytes_acked: u64,

    /// Total bytes sent when the most recently acked packet was sent.
    total_bytes_sent_at_last_acked_packet: u64,

    /// Total bytes acked when the most recently acked packet was acked.
    total_bytes_acked_at_last_acked_packet: u64,

    /// Send time of the most recently acked packet, or of the packet that
    /// restarted the connection from idle.
    last_acked_packet_sent_time: Option<Instant>,

    /// Ack time of the most recently acked packet.
    last_acked_packet_ack_time: Option<Instant>,

    /// The first ack of the connection and the bytes acked by then. It
    /// anchors the ack rate of packets sent before any ack arrived.
    first_ack_point: Option<(Instant, u64)>,

    /// The most recently sent packet number.
    last_sent_packet: Option<u64>,

    /// Whether the sender is currently app-limited.
    is_app_limited: bool,

    /// The last packet sent before the app-limited phase began. The phase
    /// ends when a later packet is acked.
    end_of_app_limited_phase: Option<u64>,

    /// States of the packets in flight.
    packets: SentPacketMap,

    stats: SamplerStats,
}

impl BandwidthSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a packet transmission.
    pub fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        pkt_num: u64,
        bytes: u64,
        bytes_in_flight: u64,
        has_retransmittable_data: bool,
    ) {
        self.last_sent_packet = Some(pkt_num);

        if !has_retransmittable_data {
            return;
        }

        self.total_bytes_sent += bytes;

        // Restarting from idle: the first packet anchors the send rate of
        // the next flight, which yields a high send rate estimate so that
        // the ack rate dominates the sample.
        if bytes_in_flight == 0 {
            self.last_acked_packet_sent_time = Some(sent_time);
            self.total_bytes_sent_at_last_acked_packet = self.total_bytes_sent;
            if self.last_acked_packet_ack_time.is_some() {
                self.last_acked_packet_ack_time = Some(sent_time);
            }
        }

        if let Some(last) = self.packets.last_packet() {
            if pkt_num > last.saturating_add(MAX_TRACKED_PACKETS) {
                self.stats.tracked_packets_exceeded += 1;
                warn!(
                    "bandwidth sampler got packet {} more than {} above last tracked {}",
                    pkt_num, MAX_TRACKED_PACKETS, last
                );
            }
        }

        let state = SentPacketState {
            sent_time,
            size: bytes,
            total_bytes_sent: self.total_bytes_sent,
            total_bytes_sent_at_last_acked_packet: self.total_bytes_sent_at_last_acked_packet,
            last_acked_packet_sent_time: self.last_acked_packet_sent_time,
            last_acked_packet_ack_time: self.last_acked_packet_ack_time,
            total_bytes_acked_at_last_acked_packet: self.total_bytes_acked_at_last_acked_packet,
            is_app_limited: self.is_app_limited,
        };

        if !self.packets.insert(pkt_num, state) {
            self.stats.out_of_order_packets += 1;
            warn!(
                "bandwidth sampler got packet {} not above last tracked {:?}",
                pkt_num,
                self.packets.last_packet()
            );
        }
    }

    /// Record a packet acknowledgement and return the resulting sample.
    /// Unknown packets yield an empty sample.
    pub fn on_packet_acknowledged(&mut self, ack_time: Instant, pkt_num: u64) -> BandwidthSample {
        let sent = match self.packets.take(pkt_num) {
            Some(v) => v,
            None => return BandwidthSample::default(),
        };

        self.total_bytes_acked += sent.size;
        self.total_bytes_sent_at_last_acked_packet = sent.total_bytes_sent;
        self.total_bytes_acked_at_last_acked_packet = self.total_bytes_acked;
        self.last_acked_packet_sent_time = Some(sent.sent_time);
        self.last_acked_packet_ack_time = Some(ack_time);

        // The first ack anchors the packets of the first flight.
        let first_ack_point = *self
            .first_ack_point
            .get_or_insert((ack_time, self.total_bytes_acked));

        // Exit app-limited phase once a packet sent after it is acked.
        if self.is_app_limited && self.end_of_app_limited_phase.map_or(true, |end| pkt_num > end)
        {
            self.is_app_limited = false;
            self.end_of_app_limited_phase = None;
        }

        let anchor_sent_time = match sent.last_acked_packet_sent_time {
            Some(v) => v,
            None => return BandwidthSample::default(),
        };

        // Infinite send rate for packets sent at the anchor itself, such as
        // the first packet after idle.
        let send_rate = if sent.sent_time > anchor_sent_time {
            Bandwidth::from_bytes_and_time_delta(
                sent.total_bytes_sent - sent.total_bytes_sent_at_last_acked_packet,
                sent.sent_time - anchor_sent_time,
            )
        } else {
            Bandwidth::infinite()
        };

        let (anchor_ack_time, anchor_bytes_acked) = match sent.last_acked_packet_ack_time {
            Some(t) => {
                if ack_time <= t {
                    self.stats.ack_time_anomalies += 1;
                    warn!(
                        "bandwidth sampler acked packet {} at {:?}, not after anchor {:?}",
                        pkt_num, ack_time, t
                    );
                    return BandwidthSample::default();
                }
                (t, sent.total_bytes_acked_at_last_acked_packet)
            }
            None => first_ack_point,
        };

        // No valid pair of ack points yet.
        if ack_time <= anchor_ack_time {
            return BandwidthSample::default();
        }

        let ack_rate = Bandwidth::from_bytes_and_time_delta(
            self.total_bytes_acked - anchor_bytes_acked,
            ack_time - anchor_ack_time,
        );

        BandwidthSample {
            bandwidth: send_rate.min(ack_rate),
            rtt: ack_time.saturating_duration_since(sent.sent_time),
            is_app_limited: sent.is_app_limited,
        }
    }

    /// Forget a lost packet. Unknown packets are ignored.
    pub fn on_packet_lost(&mut self, pkt_num: u64) {
        self.packets.take(pkt_num);
    }

    /// Mark the sender app-limited until a packet sent after the current
    /// last sent packet is acked.
    pub fn on_app_limited(&mut self) {
        self.is_app_limited = true;
        self.end_of_app_limited_phase = self.last_sent_packet;
    }

    /// Forget every packet below `least_unacked`.
    pub fn remove_obsolete_packets(&mut self, least_unacked: u64) {
        self.packets.trim_front(least_unacked);
    }

    pub fn total_bytes_sent(&self) -> u64 {
        self.total_bytes_sent
    }

    pub fn total_bytes_acked(&self) -> u64 {
        self.total_bytes_acked
    }

    pub fn is_app_limited(&self) -> bool {
        self.is_app_limited
    }

    pub fn end_of_app_limited_phase(&self) -> Option<u64> {
        self.end_of_app_limited_phase
    }

    /// Number of packets currently tracked.
    pub fn tracked_packets(&self) -> usize {
        self.packets.len()
    }

    pub fn stats(&self) -> &SamplerStats {
        &self.stats
    }
}
