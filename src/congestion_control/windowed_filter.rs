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

/*
 * Copyright 2017, Google Inc.
 *
 * Use of this source code is governed by the following BSD-style license:
 *
 * Redistribution and use in source and binary forms, with or without
 * modification, are permitted provided that the following conditions are
 * met:
 *
 *    * Redistributions of source code must retain the above copyright
 * notice, this list of conditions and the following disclaimer.
 *    * Redistributions in binary form must reproduce the above
 * copyright notice, this list of conditions and the following disclaimer
 * in the documentation and/or other materials provided with the
 * distribution.
 *
 *    * Neither the name of Google Inc. nor the names of its
 * contributors may be used to endorse or promote products derived from
 * this software without specific prior written permission.
 *
 * THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS
 * "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT
 * LIMITED TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR
 * A PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT
 * OWNER OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL,
 * SPECIAL, EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT
 * LIMITED TO, PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE,
 * DATA, OR PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY
 * THEORY OF LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT
 * (INCLUDING NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE
 * OF THIS SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.
 */

//! A windowed max filter over values indexed by round trip count, which is
//! based on an algorithm by Kathleen Nichols.
//! Refer to <https://groups.google.com/g/bbr-dev/c/3RTgkzi5ZD8>.
//!
//! The filter keeps the best, 2nd best and 3rd best max values, maintaining
//! the invariant that the round of the n'th best >= the round of the n-1'th
//! best. The three choices are kept widely separated within the window, which
//! bounds the error when the data is monotonically decreasing over the
//! window. Upon getting a new max, everything earlier is forgotten since the
//! new sample is both the best and the most recent.

#[derive(Debug, Copy, Clone, PartialEq)]
struct Sample<V> {
    /// Sample value.
    value: V,

    /// Round trip count at which the sample was taken.
    round: u64,
}

/// Tracks the maximum value seen over the last `window` rounds.
///
/// Unset estimates read as `V::default()`.
#[derive(Debug, Clone)]
pub struct WindowedMaxFilter<V> {
    /// Window length in rounds.
    window: u64,

    /// The best, second best and third best samples.
    estimates: [Option<Sample<V>>; 3],
}

impl<V> WindowedMaxFilter<V>
where
    V: Copy + PartialOrd + Default,
{
    pub fn new(window: u64) -> Self {
        Self {
            window,
            estimates: [None; 3],
        }
    }

    /// Window length in rounds.
    pub fn window(&self) -> u64 {
        self.window
    }

    /// Forget every estimate.
    pub fn clear(&mut self) {
        self.estimates = [None; 3];
    }

    /// Force all three estimates to the given value.
    pub fn reset(&mut self, value: V, round: u64) {
        self.estimates = [Some(Sample { value, round }); 3];
    }

    pub fn get_best(&self) -> V {
        self.value_at(0)
    }

    pub fn get_second_best(&self) -> V {
        self.value_at(1)
    }

    pub fn get_third_best(&self) -> V {
        self.value_at(2)
    }

    fn value_at(&self, i: usize) -> V {
        self.estimates[i].map(|s| s.value).unwrap_or_default()
    }

    /// Offer a new value taken at `round`. Rounds must not decrease.
    pub fn update(&mut self, value: V, round: u64) {
        let sample = Sample { value, round };

        let (best, third) = match (self.estimates[0], self.estimates[2]) {
            (Some(best), Some(third)) => (best, third),
            _ => {
                self.reset(value, round);
                return;
            }
        };

        // Found a new max, or nothing is left in the window.
        if value >= best.value || round.saturating_sub(third.round) > self.window {
            self.reset(value, round);
            return;
        }

        match self.estimates[1] {
            Some(second) if value >= second.value => {
                self.estimates[1] = Some(sample);
                self.estimates[2] = Some(sample);
            }
            _ if value >= third.value => {
                self.estimates[2] = Some(sample);
            }
            _ => (),
        }

        self.expire(sample, best);
    }

    /// As rounds advance, update the 1st, 2nd and 3rd choices.
    fn expire(&mut self, sample: Sample<V>, best: Sample<V>) {
        let elapsed = sample.round.saturating_sub(best.round);

        if elapsed > self.window {
            // The best choice aged out without a better sample. Promote the
            // 2nd and 3rd choices; the 3rd choice was checked on entry to be
            // within the window, the 2nd one may not be.
            self.estimates[0] = self.estimates[1];
            self.estimates[1] = self.estimates[2];
            self.estimates[2] = Some(sample);

            if let Some(best) = self.estimates[0] {
                if sample.round.saturating_sub(best.round) > self.window {
                    self.estimates[0] = self.estimates[1];
                    self.estimates[1] = self.estimates[2];
                }
            }
            return;
        }

        // A quarter of the window passed without a new 2nd choice, so take
        // one from the 2nd quarter of the window.
        if self.estimates[1] == self.estimates[0] && elapsed > self.window / 4 {
            self.estimates[1] = Some(sample);
            self.estimates[2] = Some(sample);
            return;
        }

        // Half the window passed without a new 3rd choice, so take one from
        // the last half of the window.
        if let (Some(second), Some(third)) = (self.estimates[1], self.estimates[2]) {
            if third == second && sample.round.saturating_sub(third.round) > self.window / 2 {
                self.estimates[2] = Some(sample);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_ordered(f: &WindowedMaxFilter<u64>) {
        assert!(f.get_best() >= f.get_second_best());
        assert!(f.get_second_best() >= f.get_third_best());
    }

    #[test]
    fn windowed_filter_empty() {
        let mut f = WindowedMaxFilter::<u64>::new(10);
        assert_eq!(f.window(), 10);
        assert_eq!(f.get_best(), 0);
        assert_eq!(f.get_second_best(), 0);
        assert_eq!(f.get_third_best(), 0);

        f.update(5, 1);
        assert_eq!(f.get_best(), 5);
        assert_eq!(f.get_third_best(), 5);

        f.clear();
        assert_eq!(f.get_best(), 0);
    }

    #[test]
    fn windowed_filter_new_max() {
        let mut f = WindowedMaxFilter::new(10);
        f.update(100_u64, 0);
        f.update(90, 1);
        f.update(80, 2);
        assert_eq!(f.get_best(), 100);
        assert_ordered(&f);

        // A new max forgets everything earlier.
        f.update(150, 3);
        assert_eq!(f.get_best(), 150);
        assert_eq!(f.get_second_best(), 150);
        assert_eq!(f.get_third_best(), 150);
    }

    #[test]
    fn windowed_filter_decreasing_samples() {
        let mut f = WindowedMaxFilter::new(10);
        for round in 0..40_u64 {
            let value = 1000 - 10 * round;
            f.update(value, round);
            assert_ordered(&f);

            // Never below the latest sample, never older than the window.
            assert!(f.get_best() >= value);
            assert!(f.get_best() <= 1000 - 10 * round.saturating_sub(10));
        }
    }

    #[test]
    fn windowed_filter_expiry() {
        let mut f = WindowedMaxFilter::new(10);
        f.update(100_u64, 0);
        f.update(50, 5);
        assert_eq!(f.get_best(), 100);
        assert_eq!(f.get_second_best(), 50);

        // Still within the window.
        f.update(10, 10);
        assert_eq!(f.get_best(), 100);

        // The max from round 0 ages out, round 5 is promoted.
        f.update(20, 11);
        assert_eq!(f.get_best(), 50);
        assert_ordered(&f);

        // Everything ages out.
        f.update(1, 30);
        assert_eq!(f.get_best(), 1);
        assert_eq!(f.get_second_best(), 1);
        assert_eq!(f.get_third_best(), 1);
    }

    #[test]
    fn windowed_filter_dropped_candidates() {
        let mut f = WindowedMaxFilter::new(10);
        f.update(100_u64, 0);

        // 99 beats neither the second nor the third best, so it is dropped.
        f.update(99, 1);
        assert_eq!(f.get_second_best(), 100);

        f.update(10, 3);
        assert_eq!(f.get_second_best(), 10);

        // 99 was still within the window, yet the best falls to 10.
        f.update(10, 11);
        assert_eq!(f.get_best(), 10);
        assert_ordered(&f);
    }

    #[test]
    fn windowed_filter_reset() {
        let mut f = WindowedMaxFilter::new(10);
        f.update(100_u64, 0);
        f.reset(7, 3);
        assert_eq!(f.get_best(), 7);
        assert_eq!(f.get_second_best(), 7);
        assert_eq!(f.get_third_best(), 7);

        f.update(5, 6);
        assert_eq!(f.get_best(), 7);
        assert_eq!(f.get_second_best(), 5);
        assert_eq!(f.get_third_best(), 5);
    }
}
