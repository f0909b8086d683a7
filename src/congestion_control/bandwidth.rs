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

//! Data rate used by the bandwidth model.

use std::fmt;
use std::ops::Mul;
use std::time::Duration;

const NANOS_PER_SECOND: u128 = 1_000_000_000;

/// A data rate, stored in bits per second.
///
/// The maximum value is reserved as the infinite sentinel. Arithmetic
/// saturates instead of overflowing, so an infinite rate stays infinite.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Bandwidth {
    bits_per_second: u64,
}

impl Bandwidth {
    pub const fn zero() -> Self {
        Bandwidth { bits_per_second: 0 }
    }

    pub const fn infinite() -> Self {
        Bandwidth {
            bits_per_second: u64::MAX,
        }
    }

    pub const fn from_bits_per_second(bits_per_second: u64) -> Self {
        Bandwidth { bits_per_second }
    }

    pub const fn from_bytes_per_second(bytes_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: bytes_per_second.saturating_mul(8),
        }
    }

    pub const fn from_kbits_per_second(kbits_per_second: u64) -> Self {
        Bandwidth {
            bits_per_second: kbits_per_second.saturating_mul(1_000),
        }
    }

    /// Rate of transferring `bytes` over `delta`.
    ///
    /// A zero interval yields the infinite sentinel. A non-zero transfer
    /// never rounds down to zero.
    pub fn from_bytes_and_time_delta(bytes: u64, delta: Duration) -> Self {
        if bytes == 0 {
            return Bandwidth::zero();
        }
        let nanos = delta.as_nanos();
        if nanos == 0 {
            return Bandwidth::infinite();
        }

        let bits = bytes as u128 * 8 * NANOS_PER_SECOND / nanos;
        Bandwidth {
            bits_per_second: bits.clamp(1, u64::MAX as u128) as u64,
        }
    }

    pub const fn to_bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    pub const fn to_bytes_per_second(self) -> u64 {
        self.bits_per_second / 8
    }

    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }

    pub const fn is_infinite(self) -> bool {
        self.bits_per_second == u64::MAX
    }

    /// Bytes transferred at this rate over the given period.
    pub fn to_bytes_per_period(self, period: Duration) -> u64 {
        let bytes = self.bits_per_second as u128 * period.as_nanos() / 8 / NANOS_PER_SECOND;
        bytes.min(u64::MAX as u128) as u64
    }

    /// Time needed to transfer `bytes` at this rate, zero if the rate is zero.
    pub fn transfer_time(self, bytes: u64) -> Duration {
        if self.bits_per_second == 0 {
            return Duration::ZERO;
        }
        let nanos = bytes as u128 * 8 * NANOS_PER_SECOND / self.bits_per_second as u128;
        Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
    }
}

impl Mul<f64> for Bandwidth {
    type Output = Bandwidth;

    fn mul(self, gain: f64) -> Bandwidth {
        if self.is_infinite() {
            return self;
        }
        // Float to integer casts saturate, and NaN maps to zero.
        Bandwidth {
            bits_per_second: (self.bits_per_second as f64 * gain).round() as u64,
        }
    }
}

impl Mul<Duration> for Bandwidth {
    type Output = u64;

    fn mul(self, period: Duration) -> u64 {
        self.to_bytes_per_period(period)
    }
}

impl fmt::Debug for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.bits_per_second {
            u64::MAX => write!(f, "inf"),
            x if x < 1_000_000 => write!(f, "{:.2} Kbps", x as f64 / 1e3),
            x if x < 1_000_000_000 => write!(f, "{:.2} Mbps", x as f64 / 1e6),
            x => write!(f, "{:.2} Gbps", x as f64 / 1e9),
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
