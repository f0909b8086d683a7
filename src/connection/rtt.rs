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

use std::cmp;
use std::time::Duration;

/// RTT statistics of a network path, consumed by the congestion controller.
/// See RFC 9002 Section 5
#[derive(Debug, Clone)]
pub struct RttEstimator {
    /// RTT assumed before the first sample arrives.
    initial_rtt: Duration,

    /// The most recent RTT sample.
    latest_rtt: Duration,

    /// Exponentially weighted moving average of the adjusted RTT samples.
    smoothed_rtt: Option<Duration>,

    /// Mean deviation of the RTT samples.
    rttvar: Duration,

    /// The minimum RTT observed on the path, ignoring ack delay.
    min_rtt: Option<Duration>,
}

impl RttEstimator {
    pub fn new(initial_rtt: Duration) -> Self {
        Self {
            initial_rtt,
            latest_rtt: Duration::ZERO,
            smoothed_rtt: None,
            rttvar: initial_rtt / 2,
            min_rtt: None,
        }
    }

    /// Return the RTT used before any sample is available.
    pub fn initial_rtt(&self) -> Duration {
        self.initial_rtt
    }

    /// Return whether at least one RTT sample was taken.
    pub fn has_samples(&self) -> bool {
        self.smoothed_rtt.is_some()
    }

    /// Return the smoothed RTT, or the initial RTT before any sample.
    pub fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt.unwrap_or(self.initial_rtt)
    }

    /// Return the latest RTT sample, zero if none was taken.
    pub fn latest_rtt(&self) -> Duration {
        self.latest_rtt
    }

    /// Return the minimum RTT, zero if none was taken.
    pub fn min_rtt(&self) -> Duration {
        self.min_rtt.unwrap_or(Duration::ZERO)
    }

    /// Return the mean deviation of the RTT samples.
    pub fn mean_deviation(&self) -> Duration {
        self.rttvar
    }

    /// Replace the initial RTT if no sample was taken yet, e.g. when a
    /// resumed connection reuses the smoothed RTT of a previous one.
    pub fn try_set_init_rtt(&mut self, init_rtt: Duration) {
        if self.smoothed_rtt.is_some() {
            return;
        }

        self.initial_rtt = init_rtt;
        self.rttvar = init_rtt / 2;
    }

    /// Update estimator with the given RTT sample.
    pub fn update(&mut self, ack_delay: Duration, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }

        self.latest_rtt = rtt;
        let min_rtt = cmp::min(self.min_rtt.unwrap_or(rtt), rtt);
        self.min_rtt = Some(min_rtt);

        let smoothed_rtt = match self.smoothed_rtt {
            Some(v) => v,
            None => {
                self.smoothed_rtt = Some(rtt);
                self.rttvar = rtt / 2;
                return;
            }
        };

        // Ack delay is not subtracted if the result would fall below min_rtt.
        let adjusted_rtt = if min_rtt + ack_delay <= rtt {
            rtt - ack_delay
        } else {
            rtt
        };
        let var_sample = if smoothed_rtt > adjusted_rtt {
            smoothed_rtt - adjusted_rtt
        } else {
            adjusted_rtt - smoothed_rtt
        };

        self.rttvar = (3 * self.rttvar + var_sample) / 4;
        self.smoothed_rtt = Some((7 * smoothed_rtt + adjusted_rtt) / 8);
    }
}
