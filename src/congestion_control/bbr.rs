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

//! BBR Congestion Control.
//!
//! BBR uses recent measurements of a transport connection's delivery rate
//! and round-trip time to build an explicit model that includes both the
//! maximum recent bandwidth available to that connection, and its
//! minimum recent round-trip delay.  BBR then uses this model to control
//! both how fast it sends data and the maximum amount of data it allows
//! in flight in the network at any time.
//!
//! This is the BBRv1 flavour deployed in QUIC, which drives the model from
//! batched congestion events and carries a packet conservation based loss
//! recovery sub-state.
//!
//! See <https://datatracker.ietf.org/doc/html/draft-cardwell-iccrg-bbr-congestion-control-00>.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use std::time::Instant;

use log::*;
use rand::rngs::StdRng;
use rand::Rng;
use rand::RngCore;
use rand::SeedableRng;
use strum::IntoEnumIterator;
use strum_macros::Display;
use strum_macros::EnumIter;
use strum_macros::IntoStaticStr;

use super::bandwidth_sampler::BandwidthSampler;
use super::bandwidth_sampler::SamplerStats;
use super::windowed_filter::WindowedMaxFilter;
use super::AckedPacket;
use super::Bandwidth;
use super::CongestionController;
use super::CongestionStats;
use super::LostPacket;
use crate::rtt::RttEstimator;
use crate::Error;
use crate::Result;

/// BBRHighGain: the minimum gain value that allows the sending rate to
/// double each round (`2/ln(2)`), used in Startup for both the pacing gain
/// and the cwnd gain.
const HIGH_GAIN: f64 = 2.885;

/// The pacing gain used in Drain, which drains the queue built in Startup
/// within one round.
const DRAIN_GAIN: f64 = 1.0 / HIGH_GAIN;

/// The cwnd gain used in ProbeBW.
const PROBE_BW_CWND_GAIN: f64 = 2.0;

/// BBRGainCycleLen: the number of phases in the ProbeBW gain cycle.
const GAIN_CYCLE_LEN: usize = 8;

/// Pacing gain cycle. Each phase normally lasts for roughly min_rtt.
const PACING_GAIN_CYCLE: [f64; GAIN_CYCLE_LEN] = [1.25, 0.75, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0];

/// The length of the bandwidth max filter window in round trips. It covers
/// a whole gain cycle plus two rounds of slack.
const BANDWIDTH_WINDOW_SIZE: u64 = GAIN_CYCLE_LEN as u64 + 2;

/// The bandwidth estimate must grow by this factor each round to stay in
/// Startup.
const STARTUP_GROWTH_TARGET: f64 = 1.25;

/// Default number of rounds without enough bandwidth growth before the pipe
/// is considered full.
const DEFAULT_NUM_STARTUP_RTTS: u64 = 3;

/// The min_rtt estimate expires if no smaller sample was seen for this long.
const MIN_RTT_EXPIRY: Duration = Duration::from_secs(10);

/// The minimum time spent in ProbeRTT once in flight data reached the
/// minimum window.
const PROBE_RTT_TIME: Duration = Duration::from_millis(200);

/// The queue is considered drained while in flight data is below this
/// multiple of the target window.
const QUEUE_DRAINED_THRESHOLD: f64 = 1.25;

/// The pacing gain in Startup once a loss was detected, with slower startup.
const STARTUP_AFTER_LOSS_GAIN: f64 = 1.5;

/// The gain of the BDP based ProbeRTT window.
const MODERATE_PROBE_RTT_MULTIPLIER: f64 = 0.75;

/// Rtt samples up to this multiple of min_rtt are considered similar to it.
const SIMILAR_MIN_RTT_THRESHOLD: f64 = 1.125;

/// Connection options altering BBR, identified by their four byte tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
pub enum ConnectionOption {
    /// Exit Startup after one round without bandwidth growth.
    #[strum(serialize = "1RTT")]
    StartupOneRtt,

    /// Exit Startup after two rounds without bandwidth growth.
    #[strum(serialize = "2RTT")]
    StartupTwoRtts,

    /// Exit Startup once loss recovery is entered.
    #[strum(serialize = "LRTT")]
    ExitStartupOnLoss,

    /// Pace at the conservative bandwidth estimate during recovery, instead
    /// of limiting the window.
    #[strum(serialize = "BBRR")]
    RateBasedRecovery,

    /// Ack aggregation headroom with a multiplier of 1.5.
    #[strum(serialize = "BBR1")]
    AckAggregationOneAndHalf,

    /// Ack aggregation headroom with a multiplier of 2.
    #[strum(serialize = "BBR2")]
    AckAggregationTwo,

    /// Do not limit the window by packet conservation in Startup.
    #[strum(serialize = "BBS1")]
    NoConservationInStartup,

    /// Losses in Startup enter recovery in medium growth.
    #[strum(serialize = "BBS2")]
    StartupMediumGrowthRecovery,

    /// Losses in Startup enter recovery in growth.
    #[strum(serialize = "BBS3")]
    StartupGrowthRecovery,

    /// Pace at 1.5 times the bandwidth estimate in Startup once a loss was
    /// detected.
    #[strum(serialize = "BBRS")]
    SlowerStartup,

    /// Keep the max ack height for 20 rounds.
    #[strum(serialize = "BBR4")]
    AckHeightTwentyRtts,

    /// Keep the max ack height for 40 rounds.
    #[strum(serialize = "BBR5")]
    AckHeightFortyRtts,

    /// Use 0.75 * BDP as the ProbeRTT window instead of the minimal window.
    #[strum(serialize = "BBR6")]
    ProbeRttBdpTarget,

    /// Skip ProbeRTT once after an app-limited period if no rtt sample grew
    /// more than 12.5% above min_rtt.
    #[strum(serialize = "BBR7")]
    SkipProbeRttIfSimilarRtt,

    /// Skip ProbeRTT once after an app-limited period.
    #[strum(serialize = "BBR8")]
    SkipProbeRttIfAppLimited,

    /// Use a minimal window of one packet.
    #[strum(serialize = "MIN1")]
    MinCwndOnePacket,
}

impl ConnectionOption {
    /// Parse a list of tags separated by commas or whitespace.
    pub fn parse_list(tags: &str) -> Result<Vec<ConnectionOption>> {
        tags.split(|c: char| c == ',' || c.is_whitespace())
            .filter(|tag| !tag.is_empty())
            .map(ConnectionOption::from_str)
            .collect()
    }
}

impl FromStr for ConnectionOption {
    type Err = Error;

    fn from_str(tag: &str) -> Result<ConnectionOption> {
        ConnectionOption::iter()
            .find(|opt| <&'static str>::from(*opt) == tag)
            .ok_or_else(|| Error::UnknownConnectionOption(tag.into()))
    }
}

/// Extra room added to the target congestion window once the pipe is full,
/// accounting for acks arriving in aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum CwndHeadroom {
    /// Add the max recently measured ack aggregation.
    #[default]
    AckHeight,

    /// Add `multiplier * max_ack_height` minus half of the bytes acked since
    /// the queue was last drained.
    AggregationBytes(f64),

    /// Add `weight * rtt_mean_deviation * bandwidth`.
    RttVariance(f64),
}

/// BBR configurable parameters.
#[derive(Debug, Clone)]
pub struct BbrConfig {
    /// Minimal congestion window in bytes.
    min_cwnd: u64,

    /// Initial congestion window in bytes.
    initial_cwnd: u64,

    /// Maximal congestion window in bytes.
    max_cwnd: u64,

    /// Initial Smoothed rtt.
    initial_rtt: Option<Duration>,

    /// Max datagram size in bytes.
    max_datagram_size: u64,

    /// Rounds without bandwidth growth before leaving Startup.
    num_startup_rtts: u64,

    /// Leave Startup once loss recovery is entered.
    exit_startup_on_loss: bool,

    /// Rate based instead of window based loss recovery.
    rate_based_recovery: bool,

    /// Cwnd headroom policy once the pipe is full.
    cwnd_headroom: CwndHeadroom,

    /// Ignore the recovery window in Startup.
    rate_based_startup: bool,

    /// The recovery state entered on losses in Startup.
    startup_recovery_state: RecoveryState,

    /// Pace at STARTUP_AFTER_LOSS_GAIN in Startup once a loss was detected.
    slower_startup: bool,

    /// Window of the max ack height filter in rounds.
    ack_height_window: u64,

    /// Use a BDP based window in ProbeRTT.
    probe_rtt_based_on_bdp: bool,

    /// Extend an expired min_rtt after an app-limited period if the rtt
    /// stayed similar.
    probe_rtt_skipped_if_similar_rtt: bool,

    /// Extend an expired min_rtt after an app-limited period.
    probe_rtt_disabled_if_app_limited: bool,
}

impl BbrConfig {
    pub fn new(
        min_cwnd: u64,
        initial_cwnd: u64,
        initial_rtt: Option<Duration>,
        max_datagram_size: u64,
    ) -> Self {
        Self {
            min_cwnd,
            initial_cwnd,
            max_cwnd: crate::DEFAULT_MAX_CONGESTION_WINDOW.saturating_mul(max_datagram_size),
            initial_rtt,
            max_datagram_size,
            num_startup_rtts: DEFAULT_NUM_STARTUP_RTTS,
            exit_startup_on_loss: false,
            rate_based_recovery: false,
            cwnd_headroom: CwndHeadroom::default(),
            rate_based_startup: false,
            startup_recovery_state: RecoveryState::Conservation,
            slower_startup: false,
            ack_height_window: BANDWIDTH_WINDOW_SIZE,
            probe_rtt_based_on_bdp: false,
            probe_rtt_skipped_if_similar_rtt: false,
            probe_rtt_disabled_if_app_limited: false,
        }
    }

    /// Set the maximal congestion window in bytes.
    pub fn set_max_cwnd(&mut self, max_cwnd: u64) {
        self.max_cwnd = max_cwnd;
    }

    /// Set the number of rounds without bandwidth growth before leaving
    /// Startup.
    pub fn set_num_startup_rtts(&mut self, rounds: u64) {
        self.num_startup_rtts = rounds;
    }

    pub fn enable_exit_startup_on_loss(&mut self, v: bool) {
        self.exit_startup_on_loss = v;
    }

    pub fn enable_rate_based_recovery(&mut self, v: bool) {
        self.rate_based_recovery = v;
    }

    pub fn set_cwnd_headroom(&mut self, headroom: CwndHeadroom) {
        self.cwnd_headroom = headroom;
    }

    /// Set the recovery state entered on losses in Startup.
    pub fn set_startup_recovery_state(&mut self, state: RecoveryState) {
        self.startup_recovery_state = state;
    }

    /// Set the window of the max ack height filter in rounds.
    pub fn set_ack_height_window(&mut self, rounds: u64) {
        self.ack_height_window = rounds;
    }

    /// Apply negotiated connection options on top of the current values.
    pub fn apply_connection_options(&mut self, options: &[ConnectionOption]) {
        for opt in options {
            match opt {
                ConnectionOption::StartupOneRtt => self.num_startup_rtts = 1,
                ConnectionOption::StartupTwoRtts => self.num_startup_rtts = 2,
                ConnectionOption::ExitStartupOnLoss => self.exit_startup_on_loss = true,
                ConnectionOption::RateBasedRecovery => self.rate_based_recovery = true,
                ConnectionOption::AckAggregationOneAndHalf => {
                    self.cwnd_headroom = CwndHeadroom::AggregationBytes(1.5)
                }
                ConnectionOption::AckAggregationTwo => {
                    self.cwnd_headroom = CwndHeadroom::AggregationBytes(2.0)
                }
                ConnectionOption::NoConservationInStartup => self.rate_based_startup = true,
                ConnectionOption::StartupMediumGrowthRecovery => {
                    self.startup_recovery_state = RecoveryState::MediumGrowth
                }
                ConnectionOption::StartupGrowthRecovery => {
                    self.startup_recovery_state = RecoveryState::Growth
                }
                ConnectionOption::SlowerStartup => self.slower_startup = true,
                ConnectionOption::AckHeightTwentyRtts => {
                    self.ack_height_window = 2 * BANDWIDTH_WINDOW_SIZE
                }
                ConnectionOption::AckHeightFortyRtts => {
                    self.ack_height_window = 4 * BANDWIDTH_WINDOW_SIZE
                }
                ConnectionOption::ProbeRttBdpTarget => self.probe_rtt_based_on_bdp = true,
                ConnectionOption::SkipProbeRttIfSimilarRtt => {
                    self.probe_rtt_skipped_if_similar_rtt = true
                }
                ConnectionOption::SkipProbeRttIfAppLimited => {
                    self.probe_rtt_disabled_if_app_limited = true
                }
                ConnectionOption::MinCwndOnePacket => self.min_cwnd = self.max_datagram_size,
            }
        }
    }

    /// Check the parameters are consistent.
    pub fn validate(&self) -> Result<()> {
        if self.max_datagram_size == 0 {
            return Err(Error::InvalidConfig("zero max datagram size".into()));
        }
        if self.min_cwnd == 0 || self.min_cwnd > self.initial_cwnd {
            return Err(Error::InvalidConfig(format!(
                "min cwnd {} out of range, initial cwnd {}",
                self.min_cwnd, self.initial_cwnd
            )));
        }
        if self.initial_cwnd > self.max_cwnd {
            return Err(Error::InvalidConfig(format!(
                "initial cwnd {} exceeds max cwnd {}",
                self.initial_cwnd, self.max_cwnd
            )));
        }
        if self.num_startup_rtts == 0 {
            return Err(Error::InvalidConfig("zero startup rounds".into()));
        }
        if self.ack_height_window == 0 {
            return Err(Error::InvalidConfig("zero ack height window".into()));
        }
        if self.startup_recovery_state == RecoveryState::NotInRecovery {
            return Err(Error::InvalidConfig("bad startup recovery state".into()));
        }
        match self.cwnd_headroom {
            CwndHeadroom::AggregationBytes(v) | CwndHeadroom::RttVariance(v)
                if !v.is_finite() || v < 0.0 =>
            {
                Err(Error::InvalidConfig(format!("bad cwnd headroom factor {}", v)))
            }
            _ => Ok(()),
        }
    }
}

impl Default for BbrConfig {
    fn default() -> Self {
        let mss = crate::DEFAULT_SEND_UDP_PAYLOAD_SIZE as u64;
        Self::new(
            crate::DEFAULT_MIN_CONGESTION_WINDOW * mss,
            crate::DEFAULT_INITIAL_CONGESTION_WINDOW * mss,
            Some(crate::INITIAL_RTT),
            mss,
        )
    }
}

/// BBR State Machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum BbrMode {
    /// Ramp up the sending rate rapidly to fill the pipe.
    Startup,

    /// Drain the queue created during Startup.
    Drain,

    /// Cruise mode, probing for more bandwidth by gain cycling.
    ProbeBw,

    /// Temporarily slow down to refresh the min_rtt estimate.
    ProbeRtt,
}

/// Loss recovery sub-state, orthogonal to the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RecoveryState {
    /// Not in recovery.
    NotInRecovery,

    /// Allow an extra outstanding byte for each byte acknowledged.
    Conservation,

    /// Allow 1.5 extra outstanding bytes for each byte acknowledged.
    MediumGrowth,

    /// Allow two extra outstanding bytes for each byte acknowledged, which
    /// is slow start.
    Growth,
}

/// Round trip counter for tracking packet-timed round trips which starts
/// at the transmission of some packet, and then ends at the ack of that
/// packet.
#[derive(Debug, Default)]
struct RoundTripCounter {
    /// Count of packet-timed round trips.
    round_count: u64,

    /// The last packet sent when the current round trip started. The round
    /// ends once a later packet is acked.
    current_round_trip_end: Option<u64>,
}

impl RoundTripCounter {
    /// Advance the round if `last_acked` ends it, returns whether a new
    /// round started.
    fn update(&mut self, last_acked: u64, last_sent: Option<u64>) -> bool {
        if matches!(self.current_round_trip_end, Some(end) if last_acked <= end) {
            return false;
        }
        self.round_count += 1;
        self.current_round_trip_end = last_sent;
        true
    }
}

/// Full bandwidth estimator, used mainly during Startup mode.
#[derive(Debug, Default)]
struct FullBandwidthEstimator {
    /// Whether BBR estimates that it has ever fully utilized its available
    /// bandwidth ("filled the pipe").
    is_at_full_bandwidth: bool,

    /// Baseline bandwidth recorded at the last round with enough growth.
    bandwidth_at_last_round: Bandwidth,

    /// The number of rounds without enough bandwidth growth.
    rounds_without_bandwidth_gain: u64,
}

/// Ack aggregation accounting. An aggregation epoch lasts while acks arrive
/// faster than the bandwidth estimate predicts.
#[derive(Debug, Default)]
struct AckAggregationState {
    /// Start time of the current epoch.
    epoch_start: Option<Instant>,

    /// Bytes acked during the current epoch.
    epoch_bytes: u64,

    /// Bytes acked since in flight data last fell below the queue drained
    /// threshold.
    bytes_acked_since_queue_drained: u64,
}

/// Snapshot of the internal state of a BBR controller.
#[derive(Debug, Clone, PartialEq)]
pub struct BbrDebugState {
    pub mode: BbrMode,
    pub recovery_state: RecoveryState,
    pub max_bandwidth: Bandwidth,
    pub round_trip_count: u64,
    pub current_round_trip_end: Option<u64>,
    pub gain_cycle_index: usize,
    pub last_cycle_start: Option<Instant>,
    pub congestion_window: u64,
    pub recovery_window: u64,
    pub pacing_rate: Bandwidth,
    pub pacing_gain: f64,
    pub cwnd_gain: f64,
    pub is_at_full_bandwidth: bool,
    pub bandwidth_at_last_round: Bandwidth,
    pub rounds_without_bandwidth_gain: u64,
    pub initial_congestion_window: u64,
    pub max_congestion_window: u64,
    pub min_rtt: Duration,
    pub min_rtt_timestamp: Option<Instant>,
    pub last_sample_is_app_limited: bool,
    pub has_non_app_limited_sample: bool,
    pub end_of_app_limited_phase: Option<u64>,
    pub exit_probe_rtt_at: Option<Instant>,
    pub probe_rtt_round_passed: bool,
    pub exiting_quiescence: bool,
    pub app_limited_since_last_probe_rtt: bool,
    pub end_recovery_at: Option<u64>,
    pub last_sent_packet: Option<u64>,
    pub max_ack_height: u64,
    pub aggregation_epoch_bytes: u64,
    pub bytes_acked_since_queue_drained: u64,
    pub sampler: SamplerStats,
}

impl fmt::Display for BbrDebugState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "mode={} recovery={} bw={} round={} cwnd={} recovery_window={} \
             pacing_rate={} pacing_gain={:.2} cwnd_gain={:.2} min_rtt={:?} full_bw={} \
             app_limited={} max_ack_height={}",
            self.mode,
            self.recovery_state,
            self.max_bandwidth,
            self.round_trip_count,
            self.congestion_window,
            self.recovery_window,
            self.pacing_rate,
            self.pacing_gain,
            self.cwnd_gain,
            self.min_rtt,
            self.is_at_full_bandwidth,
            self.last_sample_is_app_limited,
            self.max_ack_height,
        )
    }
}

/// BBR Congestion Control Algorithm.
///
/// The random source picks the ProbeBW gain cycle offset.
#[derive(Debug)]
pub struct Bbr<R = StdRng> {
    /// Configurable parameters.
    config: BbrConfig,

    /// Statistics.
    stats: CongestionStats,

    /// Random source for gain cycle randomization.
    rng: R,

    /// State.
    mode: BbrMode,

    /// Loss recovery state.
    recovery_state: RecoveryState,

    /// Delivery rate samples.
    sampler: BandwidthSampler,

    /// The max filter used to estimate the bottleneck bandwidth.
    max_bandwidth: WindowedMaxFilter<Bandwidth>,

    /// The max filter of bytes acked in excess of the bandwidth estimate.
    max_ack_height: WindowedMaxFilter<u64>,

    /// Counter of packet-timed round trips.
    round: RoundTripCounter,

    /// Estimator of full bandwidth.
    full_bw: FullBandwidthEstimator,

    /// Ack aggregation accounting.
    ack_aggregation: AckAggregationState,

    /// The most recently sent packet number.
    last_sent_packet: Option<u64>,

    /// Cwnd: The transport sender's congestion window, which limits the
    /// amount of data in flight.
    cwnd: u64,

    /// The window enforced during loss recovery, zero until seeded.
    recovery_window: u64,

    /// The current pacing rate, zero until the first bandwidth sample.
    pacing_rate: Bandwidth,

    /// The dynamic gain factor used to scale the bandwidth estimate to
    /// produce the pacing rate.
    pacing_gain: f64,

    /// The dynamic gain factor used to scale the estimated BDP to produce a
    /// congestion window.
    cwnd_gain: f64,

    /// The windowed minimum RTT.
    min_rtt: Option<Duration>,

    /// The time at which the current min_rtt sample was obtained.
    min_rtt_timestamp: Option<Instant>,

    /// Current index of PACING_GAIN_CYCLE[].
    cycle_current_offset: usize,

    /// Last time when cycle_current_offset was updated.
    last_cycle_start: Option<Instant>,

    /// Timestamp when ProbeRTT state ends, set once in flight data reached
    /// the ProbeRTT window.
    exit_probe_rtt_at: Option<Instant>,

    /// Whether a round trip passed since exit_probe_rtt_at was set.
    probe_rtt_round_passed: bool,

    /// Whether the sender restarted from an app-limited idle period.
    exiting_quiescence: bool,

    /// Whether the last bandwidth sample was app-limited.
    last_sample_is_app_limited: bool,

    /// Whether any bandwidth sample was not app-limited.
    has_non_app_limited_sample: bool,

    /// Whether the sender was app-limited since min_rtt was last refreshed.
    app_limited_since_last_probe_rtt: bool,

    /// The minimum rtt sample since min_rtt was last refreshed.
    min_rtt_since_last_probe_rtt: Option<Duration>,

    /// Recovery ends once a packet sent after this one is acked without
    /// losses.
    end_recovery_at: Option<u64>,
}

impl Bbr<StdRng> {
    pub fn new(config: BbrConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }
}

impl<R: RngCore> Bbr<R> {
    pub fn with_rng(config: BbrConfig, rng: R) -> Self {
        let initial_cwnd = config.initial_cwnd;
        let ack_height_window = config.ack_height_window;

        let mut bbr = Self {
            config,
            stats: Default::default(),
            rng,
            mode: BbrMode::Startup,
            recovery_state: RecoveryState::NotInRecovery,
            sampler: BandwidthSampler::new(),
            max_bandwidth: WindowedMaxFilter::new(BANDWIDTH_WINDOW_SIZE),
            max_ack_height: WindowedMaxFilter::new(ack_height_window),
            round: Default::default(),
            full_bw: Default::default(),
            ack_aggregation: Default::default(),
            last_sent_packet: None,
            cwnd: initial_cwnd,
            recovery_window: 0,
            pacing_rate: Bandwidth::zero(),
            pacing_gain: HIGH_GAIN,
            cwnd_gain: HIGH_GAIN,
            min_rtt: None,
            min_rtt_timestamp: None,
            cycle_current_offset: 0,
            last_cycle_start: None,
            exit_probe_rtt_at: None,
            probe_rtt_round_passed: false,
            exiting_quiescence: false,
            last_sample_is_app_limited: false,
            has_non_app_limited_sample: false,
            app_limited_since_last_probe_rtt: false,
            min_rtt_since_last_probe_rtt: None,
            end_recovery_at: None,
        };
        bbr.enter_startup();

        bbr
    }

    /// Current mode.
    pub fn mode(&self) -> BbrMode {
        self.mode
    }

    /// Current recovery state.
    pub fn recovery_state(&self) -> RecoveryState {
        self.recovery_state
    }

    /// Is pipe filled.
    pub fn is_at_full_bandwidth(&self) -> bool {
        self.full_bw.is_at_full_bandwidth
    }

    /// Export a snapshot of the internal state.
    pub fn debug_state(&self) -> BbrDebugState {
        BbrDebugState {
            mode: self.mode,
            recovery_state: self.recovery_state,
            max_bandwidth: self.max_bandwidth.get_best(),
            round_trip_count: self.round.round_count,
            current_round_trip_end: self.round.current_round_trip_end,
            gain_cycle_index: self.cycle_current_offset,
            last_cycle_start: self.last_cycle_start,
            congestion_window: self.cwnd,
            recovery_window: self.recovery_window,
            pacing_rate: self.pacing_rate,
            pacing_gain: self.pacing_gain,
            cwnd_gain: self.cwnd_gain,
            is_at_full_bandwidth: self.full_bw.is_at_full_bandwidth,
            bandwidth_at_last_round: self.full_bw.bandwidth_at_last_round,
            rounds_without_bandwidth_gain: self.full_bw.rounds_without_bandwidth_gain,
            initial_congestion_window: self.config.initial_cwnd,
            max_congestion_window: self.config.max_cwnd,
            min_rtt: self.get_min_rtt(),
            min_rtt_timestamp: self.min_rtt_timestamp,
            last_sample_is_app_limited: self.last_sample_is_app_limited,
            has_non_app_limited_sample: self.has_non_app_limited_sample,
            end_of_app_limited_phase: self.sampler.end_of_app_limited_phase(),
            exit_probe_rtt_at: self.exit_probe_rtt_at,
            probe_rtt_round_passed: self.probe_rtt_round_passed,
            exiting_quiescence: self.exiting_quiescence,
            app_limited_since_last_probe_rtt: self.app_limited_since_last_probe_rtt,
            end_recovery_at: self.end_recovery_at,
            last_sent_packet: self.last_sent_packet,
            max_ack_height: self.max_ack_height.get_best(),
            aggregation_epoch_bytes: self.ack_aggregation.epoch_bytes,
            bytes_acked_since_queue_drained: self.ack_aggregation.bytes_acked_since_queue_drained,
            sampler: self.sampler.stats().clone(),
        }
    }

    fn set_mode(&mut self, mode: BbrMode) {
        if self.mode != mode {
            debug!("{} mode {} -> {}", self.name(), self.mode, mode);
        }
        self.mode = mode;
    }

    fn set_recovery_state(&mut self, state: RecoveryState) {
        if self.recovery_state != state {
            debug!(
                "{} recovery state {} -> {}",
                self.name(),
                self.recovery_state,
                state
            );
        }
        self.recovery_state = state;
    }

    /// The min_rtt estimate, or the initial rtt before any sample.
    fn get_min_rtt(&self) -> Duration {
        self.min_rtt
            .or(self.config.initial_rtt)
            .unwrap_or(crate::INITIAL_RTT)
    }

    /// Calculate the target cwnd, which is the upper bound on the volume of
    /// data BBR allows in flight, for the given gain.
    fn get_target_congestion_window(&self, gain: f64) -> u64 {
        let bdp = self.bandwidth_estimate() * self.get_min_rtt();
        let mut cwnd = (gain * bdp as f64) as u64;

        // The BDP is zero if no bandwidth sample is available yet.
        if cwnd == 0 {
            cwnd = (gain * self.config.initial_cwnd as f64) as u64;
        }

        cwnd.max(self.config.min_cwnd)
    }

    /// Enter the Startup state.
    fn enter_startup(&mut self) {
        self.set_mode(BbrMode::Startup);
        self.pacing_gain = HIGH_GAIN;
        self.cwnd_gain = HIGH_GAIN;
    }

    /// Enter the ProbeBW state.
    fn enter_probe_bw(&mut self, now: Instant) {
        self.set_mode(BbrMode::ProbeBw);
        self.cwnd_gain = PROBE_BW_CWND_GAIN;

        // Pick a random offset for the gain cycle out of {0, 2..7}. Phase 1 is
        // excluded since the increased and the decreased gain would not
        // follow each other.
        self.cycle_current_offset = self.rng.gen_range(0..GAIN_CYCLE_LEN - 1);
        if self.cycle_current_offset >= 1 {
            self.cycle_current_offset += 1;
        }

        self.last_cycle_start = Some(now);
        self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_current_offset];
    }

    /// Feed the acked packets to the sampler and the bandwidth filter.
    /// Returns the minimum rtt among the samples.
    fn update_bandwidth(&mut self, now: Instant, acked: &[AckedPacket]) -> Option<Duration> {
        let mut sample_min_rtt: Option<Duration> = None;

        for packet in acked {
            let sample = self.sampler.on_packet_acknowledged(now, packet.pkt_num);
            if sample.is_empty() {
                continue;
            }
            self.last_sample_is_app_limited = sample.is_app_limited;
            if !sample.is_app_limited {
                self.has_non_app_limited_sample = true;
            }

            if !sample.rtt.is_zero() {
                sample_min_rtt = Some(sample_min_rtt.map_or(sample.rtt, |v| v.min(sample.rtt)));
            }

            // App-limited samples may only raise the estimate.
            if !sample.is_app_limited || sample.bandwidth > self.bandwidth_estimate() {
                self.max_bandwidth
                    .update(sample.bandwidth, self.round.round_count);
            }
        }

        sample_min_rtt
    }

    /// Update the min_rtt estimate, returns whether it had expired.
    fn maybe_update_min_rtt(&mut self, now: Instant, sample_min_rtt: Duration) -> bool {
        self.min_rtt_since_last_probe_rtt = Some(
            self.min_rtt_since_last_probe_rtt
                .map_or(sample_min_rtt, |v| v.min(sample_min_rtt)),
        );

        // A seeded min_rtt starts aging from the first sample.
        if self.min_rtt.is_some() && self.min_rtt_timestamp.is_none() {
            self.min_rtt_timestamp = Some(now);
        }

        // Do not expire min_rtt if none was ever available.
        let mut min_rtt_expired = self
            .min_rtt_timestamp
            .map_or(false, |ts| now > ts + MIN_RTT_EXPIRY);

        if min_rtt_expired && self.should_extend_min_rtt_expiry() {
            debug!(
                "{} min_rtt {:?} extended after app-limited period",
                self.name(),
                self.min_rtt
            );
            min_rtt_expired = false;
            self.min_rtt_timestamp = Some(now);
            self.app_limited_since_last_probe_rtt = false;
            self.min_rtt_since_last_probe_rtt = None;
        } else if min_rtt_expired || self.min_rtt.map_or(true, |v| sample_min_rtt < v) {
            self.min_rtt = Some(sample_min_rtt);
            self.min_rtt_timestamp = Some(now);
            self.app_limited_since_last_probe_rtt = false;
            self.min_rtt_since_last_probe_rtt = None;
        }

        min_rtt_expired
    }

    /// Whether an expired min_rtt is kept for another period instead of
    /// entering ProbeRTT.
    fn should_extend_min_rtt_expiry(&self) -> bool {
        if !self.app_limited_since_last_probe_rtt {
            return false;
        }
        if self.config.probe_rtt_disabled_if_app_limited {
            return true;
        }

        let rtt_similar = match (self.min_rtt, self.min_rtt_since_last_probe_rtt) {
            (Some(min_rtt), Some(v)) => v <= min_rtt.mul_f64(SIMILAR_MIN_RTT_THRESHOLD),
            _ => false,
        };
        self.config.probe_rtt_skipped_if_similar_rtt && rtt_similar
    }

    fn update_recovery_state(&mut self, last_acked: u64, has_losses: bool, is_round_start: bool) {
        // Exit recovery when there are no losses for a round.
        if has_losses {
            self.end_recovery_at = self.last_sent_packet;
        }

        match self.recovery_state {
            RecoveryState::NotInRecovery => {
                // Enter recovery on the first loss.
                if has_losses {
                    let state = if self.mode == BbrMode::Startup {
                        self.config.startup_recovery_state
                    } else {
                        RecoveryState::Conservation
                    };
                    self.set_recovery_state(state);
                    // Seeded again in calculate_recovery_window().
                    self.recovery_window = 0;
                    // The conservation phase lasts for a whole round, so extend
                    // the current round as if it started right now.
                    self.round.current_round_trip_end = self.last_sent_packet;
                }
            }

            RecoveryState::Conservation | RecoveryState::MediumGrowth | RecoveryState::Growth => {
                if self.recovery_state != RecoveryState::Growth && is_round_start {
                    self.set_recovery_state(RecoveryState::Growth);
                }

                if !has_losses && self.end_recovery_at.map_or(false, |end| last_acked > end) {
                    self.set_recovery_state(RecoveryState::NotInRecovery);
                }
            }
        }
    }

    /// Accumulate bytes acked in excess of the bandwidth estimate into the
    /// max ack height filter.
    fn update_ack_aggregation_bytes(&mut self, ack_time: Instant, newly_acked_bytes: u64) {
        let epoch_start = match self.ack_aggregation.epoch_start {
            Some(v) => v,
            None => {
                self.ack_aggregation.epoch_start = Some(ack_time);
                self.ack_aggregation.epoch_bytes = newly_acked_bytes;
                return;
            }
        };

        // Bytes expected to be delivered since the epoch started, assuming
        // the bandwidth estimate is right.
        let expected_bytes_acked =
            self.bandwidth_estimate() * ack_time.saturating_duration_since(epoch_start);

        // Reset the epoch as soon as the ack arrival rate falls to the
        // bandwidth estimate.
        if self.ack_aggregation.epoch_bytes <= expected_bytes_acked {
            self.ack_aggregation.epoch_bytes = newly_acked_bytes;
            self.ack_aggregation.epoch_start = Some(ack_time);
            return;
        }

        // Include the bytes most recently acked to account for stretch acks.
        self.ack_aggregation.epoch_bytes += newly_acked_bytes;
        self.max_ack_height.update(
            self.ack_aggregation.epoch_bytes - expected_bytes_acked,
            self.round.round_count,
        );
    }

    fn update_bytes_acked_since_queue_drained(&mut self, bytes_in_flight: u64, bytes_acked: u64) {
        let drained_threshold =
            QUEUE_DRAINED_THRESHOLD * self.get_target_congestion_window(self.pacing_gain) as f64;

        if bytes_in_flight as f64 <= drained_threshold {
            self.ack_aggregation.bytes_acked_since_queue_drained = 0;
        } else {
            self.ack_aggregation.bytes_acked_since_queue_drained += bytes_acked;
        }
    }

    /// Advance the gain cycle phase during ProbeBW state.
    fn update_gain_cycle_phase(
        &mut self,
        now: Instant,
        prior_in_flight: u64,
        has_losses: bool,
        bytes_in_flight: u64,
    ) {
        // In most cases, the cycle is advanced after min_rtt passes.
        let mut should_advance = self.last_cycle_start.map_or(true, |start| {
            now.saturating_duration_since(start) > self.get_min_rtt()
        });

        // While probing with a gain above 1, in flight data has to reach
        // pacing_gain * BDP, unless losses show the buffers can not hold
        // that much.
        if self.pacing_gain > 1.0
            && !has_losses
            && prior_in_flight < self.get_target_congestion_window(self.pacing_gain)
        {
            should_advance = false;
        }

        // While draining with a gain below 1, exit as soon as in flight data
        // falls to the BDP.
        if self.pacing_gain < 1.0 && bytes_in_flight <= self.get_target_congestion_window(1.0) {
            should_advance = true;
        }

        if should_advance {
            self.cycle_current_offset = (self.cycle_current_offset + 1) % GAIN_CYCLE_LEN;
            self.last_cycle_start = Some(now);
            self.pacing_gain = PACING_GAIN_CYCLE[self.cycle_current_offset];
        }
    }

    /// Estimate whether the pipe is full by looking for a plateau in the
    /// bandwidth estimate.
    fn check_if_full_bandwidth_reached(&mut self) {
        if self.last_sample_is_app_limited {
            return;
        }

        // Bandwidth still growing?
        let target = self.full_bw.bandwidth_at_last_round * STARTUP_GROWTH_TARGET;
        let bandwidth = self.bandwidth_estimate();
        if bandwidth >= target {
            self.full_bw.bandwidth_at_last_round = bandwidth;
            self.full_bw.rounds_without_bandwidth_gain = 0;
            return;
        }

        // Another round without much growth.
        self.full_bw.rounds_without_bandwidth_gain += 1;
        if self.full_bw.rounds_without_bandwidth_gain >= self.config.num_startup_rtts
            || (self.config.exit_startup_on_loss && self.in_recovery())
        {
            debug!(
                "{} full bandwidth reached bw={} rounds={}",
                self.name(),
                bandwidth,
                self.round.round_count
            );
            self.full_bw.is_at_full_bandwidth = true;
        }
    }

    /// Leave Startup once the pipe is full, and Drain once the queue is
    /// drained.
    fn maybe_exit_startup_or_drain(&mut self, now: Instant, bytes_in_flight: u64) {
        if self.mode == BbrMode::Startup && self.full_bw.is_at_full_bandwidth {
            self.set_mode(BbrMode::Drain);
            self.pacing_gain = DRAIN_GAIN;
            self.cwnd_gain = HIGH_GAIN;
        }

        if self.mode == BbrMode::Drain && bytes_in_flight <= self.get_target_congestion_window(1.0)
        {
            self.enter_probe_bw(now);
        }
    }

    /// Check and try to enter or leave ProbeRTT state.
    fn maybe_enter_or_exit_probe_rtt(
        &mut self,
        now: Instant,
        is_round_start: bool,
        min_rtt_expired: bool,
        bytes_in_flight: u64,
    ) {
        if min_rtt_expired && !self.exiting_quiescence && self.mode != BbrMode::ProbeRtt {
            self.set_mode(BbrMode::ProbeRtt);
            self.pacing_gain = 1.0;
            // The exit time is decided once in flight data reached the
            // ProbeRTT window.
            self.exit_probe_rtt_at = None;
        }

        if self.mode == BbrMode::ProbeRtt {
            // Ignore low rate samples during ProbeRTT.
            self.sampler.on_app_limited();

            match self.exit_probe_rtt_at {
                None => {
                    // Allow an extra packet since the window is checked before
                    // sending a packet.
                    if bytes_in_flight
                        < self.probe_rtt_congestion_window() + self.config.max_datagram_size
                    {
                        self.exit_probe_rtt_at = Some(now + PROBE_RTT_TIME);
                        self.probe_rtt_round_passed = false;
                    }
                }
                Some(exit_at) => {
                    if is_round_start {
                        self.probe_rtt_round_passed = true;
                    }
                    if now >= exit_at && self.probe_rtt_round_passed {
                        self.min_rtt_timestamp = Some(now);
                        if !self.full_bw.is_at_full_bandwidth {
                            self.enter_startup();
                        } else {
                            self.enter_probe_bw(now);
                        }
                    }
                }
            }
        }

        self.exiting_quiescence = false;
    }

    /// Update the pacing rate from the bandwidth estimate.
    fn calculate_pacing_rate(&mut self, rtt: &RttEstimator) {
        let bandwidth = self.bandwidth_estimate();
        if bandwidth.is_zero() {
            return;
        }

        let target_rate = bandwidth * self.pacing_gain;

        // Pace at the conservative estimate during rate based recovery.
        if self.config.rate_based_recovery && self.in_recovery() {
            self.pacing_rate = self.max_bandwidth.get_third_best() * self.pacing_gain;
            return;
        }

        if self.full_bw.is_at_full_bandwidth {
            self.pacing_rate = target_rate;
            return;
        }

        // Pace at the rate of initial_window / RTT as soon as RTT measurements
        // are available.
        if self.pacing_rate.is_zero() && !rtt.min_rtt().is_zero() {
            self.pacing_rate =
                Bandwidth::from_bytes_and_time_delta(self.config.initial_cwnd, rtt.min_rtt());
            return;
        }

        // Slow down in Startup once a loss was ever detected.
        if self.config.slower_startup
            && self.end_recovery_at.is_some()
            && self.has_non_app_limited_sample
        {
            self.pacing_rate = bandwidth * STARTUP_AFTER_LOSS_GAIN;
            return;
        }

        // Do not decrease the pacing rate during Startup.
        self.pacing_rate = self.pacing_rate.max(target_rate);
    }

    /// The window enforced in ProbeRTT.
    fn probe_rtt_congestion_window(&self) -> u64 {
        if self.config.probe_rtt_based_on_bdp {
            return self.get_target_congestion_window(MODERATE_PROBE_RTT_MULTIPLIER);
        }
        self.config.min_cwnd
    }

    /// Extra window for ack aggregation once the pipe is full.
    fn cwnd_headroom(&self, rtt: &RttEstimator) -> u64 {
        let max_ack_height = self.max_ack_height.get_best();

        match self.config.cwnd_headroom {
            CwndHeadroom::AckHeight => max_ack_height,
            CwndHeadroom::AggregationBytes(multiplier) => {
                // Subtracting only half of the bytes acked since the queue was
                // drained keeps the sender going while the queue stays full.
                let headroom = multiplier * max_ack_height as f64;
                let drained = (self.ack_aggregation.bytes_acked_since_queue_drained / 2) as f64;
                if headroom > drained {
                    (headroom - drained) as u64
                } else {
                    0
                }
            }
            CwndHeadroom::RttVariance(weight) => {
                let bandwidth = self.bandwidth_estimate();
                if bandwidth.is_zero() {
                    return 0;
                }
                (weight * (bandwidth * rtt.mean_deviation()) as f64) as u64
            }
        }
    }

    /// Grow the cwnd towards the target window.
    fn calculate_congestion_window(&mut self, bytes_acked: u64, rtt: &RttEstimator) {
        if self.mode == BbrMode::ProbeRtt {
            return;
        }

        let mut target_window = self.get_target_congestion_window(self.cwnd_gain);
        if self.full_bw.is_at_full_bandwidth {
            target_window = target_window.saturating_add(self.cwnd_headroom(rtt));
        }

        // Instead of immediately setting the target cwnd, grow towards it by
        // only bytes_acked at a time.
        if self.full_bw.is_at_full_bandwidth {
            self.cwnd = target_window.min(self.cwnd.saturating_add(bytes_acked));
        } else if self.cwnd < target_window
            || self.sampler.total_bytes_acked() < self.config.initial_cwnd
        {
            // The window only grows before the pipe is full.
            self.cwnd = self.cwnd.saturating_add(bytes_acked);
        }

        self.cwnd = self.cwnd.max(self.config.min_cwnd).min(self.config.max_cwnd);
    }

    fn calculate_recovery_window(&mut self, bytes_acked: u64, bytes_lost: u64, bytes_in_flight: u64) {
        if self.recovery_state == RecoveryState::NotInRecovery {
            return;
        }

        // Set up the initial recovery window.
        if self.recovery_window == 0 {
            self.recovery_window = (bytes_in_flight + bytes_acked).max(self.config.min_cwnd);
            return;
        }

        // Remove losses from the recovery window, falling back to one packet
        // on underflow.
        self.recovery_window = self
            .recovery_window
            .checked_sub(bytes_lost)
            .unwrap_or(self.config.max_datagram_size);

        // Release additional bytes_acked in GROWTH, for a slow start like
        // behavior, and half of them in MEDIUM_GROWTH.
        match self.recovery_state {
            RecoveryState::Growth => self.recovery_window += bytes_acked,
            RecoveryState::MediumGrowth => self.recovery_window += bytes_acked / 2,
            _ => (),
        }

        // Always allow sending at least bytes_acked in response.
        self.recovery_window = self
            .recovery_window
            .max(bytes_in_flight + bytes_acked)
            .max(self.config.min_cwnd);
    }
}

impl<R: RngCore> CongestionController for Bbr<R> {
    fn name(&self) -> &str {
        "BBR"
    }

    fn on_packet_sent(
        &mut self,
        sent_time: Instant,
        bytes_in_flight: u64,
        pkt_num: u64,
        bytes: u64,
        has_retransmittable_data: bool,
    ) {
        self.last_sent_packet = Some(pkt_num);

        if bytes_in_flight == 0 && self.sampler.is_app_limited() {
            self.exiting_quiescence = true;
        }

        if self.ack_aggregation.epoch_start.is_none() {
            self.ack_aggregation.epoch_start = Some(sent_time);
        }

        self.sampler.on_packet_sent(
            sent_time,
            pkt_num,
            bytes,
            bytes_in_flight,
            has_retransmittable_data,
        );

        if has_retransmittable_data {
            self.stats.bytes_in_flight = bytes_in_flight + bytes;
            self.stats.bytes_sent_in_total = self.stats.bytes_sent_in_total.saturating_add(bytes);
            if self.in_slow_start() {
                self.stats.bytes_sent_in_slow_start =
                    self.stats.bytes_sent_in_slow_start.saturating_add(bytes);
            }
        }

        trace!(
            "{} ON_SENT now={:?} pkt_num={} bytes={} inflight={} cwnd={}",
            self.name(),
            sent_time,
            pkt_num,
            bytes,
            bytes_in_flight,
            self.congestion_window()
        );
    }

    fn on_congestion_event(
        &mut self,
        rtt_updated: bool,
        prior_in_flight: u64,
        bytes_in_flight: u64,
        event_time: Instant,
        acked_packets: &[AckedPacket],
        lost_packets: &[LostPacket],
        least_unacked: u64,
        rtt: &RttEstimator,
    ) {
        let total_bytes_acked_before = self.sampler.total_bytes_acked();
        let in_slow_start = self.in_slow_start();

        let mut bytes_lost = 0;
        for packet in lost_packets {
            self.sampler.on_packet_lost(packet.pkt_num);
            bytes_lost += packet.sent_size;
        }
        let has_losses = !lost_packets.is_empty();

        let mut is_round_start = false;
        let mut min_rtt_expired = false;
        let mut bytes_acked = 0;

        if let Some(last_acked) = acked_packets.last() {
            is_round_start = self
                .round
                .update(last_acked.pkt_num, self.last_sent_packet);

            if let Some(sample_min_rtt) = self.update_bandwidth(event_time, acked_packets) {
                min_rtt_expired = self.maybe_update_min_rtt(event_time, sample_min_rtt);
            }
            self.update_recovery_state(last_acked.pkt_num, has_losses, is_round_start);

            bytes_acked = self.sampler.total_bytes_acked() - total_bytes_acked_before;
            self.update_ack_aggregation_bytes(event_time, bytes_acked);
            self.update_bytes_acked_since_queue_drained(bytes_in_flight, bytes_acked);
        }

        // Handle logic specific to ProbeBW.
        if self.mode == BbrMode::ProbeBw {
            self.update_gain_cycle_phase(event_time, prior_in_flight, has_losses, bytes_in_flight);
        }

        // Handle logic specific to Startup and Drain.
        if is_round_start && !self.full_bw.is_at_full_bandwidth {
            self.check_if_full_bandwidth_reached();
        }
        self.maybe_exit_startup_or_drain(event_time, bytes_in_flight);

        // Handle logic specific to ProbeRTT.
        self.maybe_enter_or_exit_probe_rtt(event_time, is_round_start, min_rtt_expired, bytes_in_flight);

        // After the model is updated, recalculate the pacing rate and the
        // congestion window.
        self.calculate_pacing_rate(rtt);
        self.calculate_congestion_window(bytes_acked, rtt);
        self.calculate_recovery_window(bytes_acked, bytes_lost, bytes_in_flight);

        // Cleanup internal state.
        self.sampler.remove_obsolete_packets(least_unacked);

        let acked_size: u64 = acked_packets.iter().map(|p| p.sent_size).sum();
        self.stats.bytes_in_flight = bytes_in_flight;
        self.stats.bytes_acked_in_total = self.stats.bytes_acked_in_total.saturating_add(acked_size);
        self.stats.bytes_lost_in_total = self.stats.bytes_lost_in_total.saturating_add(bytes_lost);
        if in_slow_start {
            self.stats.bytes_acked_in_slow_start =
                self.stats.bytes_acked_in_slow_start.saturating_add(acked_size);
            self.stats.bytes_lost_in_slow_start =
                self.stats.bytes_lost_in_slow_start.saturating_add(bytes_lost);
        }

        if log_enabled!(Level::Trace) {
            trace!(
                "{} ON_CONGESTION_EVENT now={:?} rtt_updated={} acked={} lost={} \
                 prior_inflight={} inflight={} {}",
                self.name(),
                event_time,
                rtt_updated,
                acked_packets.len(),
                lost_packets.len(),
                prior_in_flight,
                bytes_in_flight,
                self.debug_state()
            );
        }
    }

    fn on_app_limited(&mut self, bytes_in_flight: u64) {
        if bytes_in_flight >= self.congestion_window() {
            return;
        }
        self.app_limited_since_last_probe_rtt = true;
        self.sampler.on_app_limited();
        trace!(
            "{} ON_APP_LIMITED inflight={} last_sent={:?}",
            self.name(),
            bytes_in_flight,
            self.last_sent_packet
        );
    }

    fn in_slow_start(&self) -> bool {
        self.mode == BbrMode::Startup
    }

    fn in_recovery(&self) -> bool {
        self.recovery_state != RecoveryState::NotInRecovery
    }

    fn is_probing_for_more_bandwidth(&self) -> bool {
        (self.mode == BbrMode::ProbeBw && self.pacing_gain > 1.0) || self.mode == BbrMode::Startup
    }

    fn congestion_window(&self) -> u64 {
        if self.mode == BbrMode::ProbeRtt {
            return self.probe_rtt_congestion_window();
        }

        let rate_based = self.config.rate_based_recovery
            || (self.config.rate_based_startup && self.mode == BbrMode::Startup);
        if self.in_recovery() && !rate_based {
            return self.cwnd.min(self.recovery_window);
        }

        self.cwnd
    }

    fn pacing_rate(&self, _bytes_in_flight: u64) -> Bandwidth {
        if self.pacing_rate.is_zero() {
            return Bandwidth::from_bytes_and_time_delta(self.config.initial_cwnd, self.get_min_rtt())
                * HIGH_GAIN;
        }
        self.pacing_rate
    }

    fn bandwidth_estimate(&self) -> Bandwidth {
        self.max_bandwidth.get_best()
    }

    fn adjust_network_parameters(&mut self, bandwidth: Bandwidth, rtt: Duration) {
        if !bandwidth.is_zero() {
            self.max_bandwidth.update(bandwidth, self.round.round_count);
        }

        if !rtt.is_zero() && self.min_rtt.map_or(true, |v| rtt < v) {
            self.min_rtt = Some(rtt);
        }

        debug!(
            "{} adjust network parameters bw={} rtt={:?} min_rtt={:?}",
            self.name(),
            bandwidth,
            rtt,
            self.min_rtt
        );
    }

    fn initial_window(&self) -> u64 {
        self.config.initial_cwnd
    }

    fn minimal_window(&self) -> u64 {
        self.config.min_cwnd
    }

    fn stats(&self) -> &CongestionStats {
        &self.stats
    }
}
