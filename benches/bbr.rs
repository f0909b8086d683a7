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

use std::collections::VecDeque;
use std::time::Duration;
use std::time::Instant;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

use tquic_bbr::AckedPacket;
use tquic_bbr::Bandwidth;
use tquic_bbr::BandwidthSampler;
use tquic_bbr::Config;
use tquic_bbr::CongestionController;
use tquic_bbr::RttEstimator;
use tquic_bbr::WindowedMaxFilter;

const MSS: u64 = 1200;
const PACKETS: u64 = 10_000;

/// Transfer packets over a 10 Mbps link with 50ms of propagation delay.
fn transfer(cc: &mut Box<dyn CongestionController>, packets: u64) {
    let link = Bandwidth::from_kbits_per_second(10_000);
    let delay = Duration::from_millis(50);
    let mut rtt = RttEstimator::new(tquic_bbr::INITIAL_RTT);

    let mut now = Instant::now();
    let mut link_free_at = now;
    let mut in_flight: VecDeque<(u64, Instant, Instant)> = VecDeque::new();
    let mut bytes_in_flight = 0;
    let mut next_pkt_num = 1;
    let mut acked_packets = 0;

    while acked_packets < packets {
        if next_pkt_num <= packets && cc.can_send(bytes_in_flight) {
            let depart = link_free_at.max(now) + link.transfer_time(MSS);
            link_free_at = depart;
            in_flight.push_back((next_pkt_num, now, depart + delay));
            cc.on_packet_sent(now, bytes_in_flight, next_pkt_num, MSS, true);
            bytes_in_flight += MSS;
            next_pkt_num += 1;
            now += cc.pacing_rate(bytes_in_flight).transfer_time(MSS);
            continue;
        }

        let (pkt_num, sent_time, ack_time) = match in_flight.pop_front() {
            Some(v) => v,
            None => break,
        };
        now = now.max(ack_time);
        let prior_in_flight = bytes_in_flight;
        bytes_in_flight -= MSS;
        rtt.update(Duration::ZERO, now - sent_time);
        let least_unacked = in_flight.front().map_or(next_pkt_num, |p| p.0);
        let acked = [AckedPacket {
            pkt_num,
            sent_size: MSS,
        }];
        cc.on_congestion_event(
            true,
            prior_in_flight,
            bytes_in_flight,
            now,
            &acked,
            &[],
            least_unacked,
            &rtt,
        );
        acked_packets += 1;
    }
}

pub fn bbr_transfer_benchmark(c: &mut Criterion) {
    let conf = Config::new();
    c.bench_function("bbr transfer", |b| {
        b.iter(|| {
            let mut cc = tquic_bbr::build_congestion_controller(&conf.recovery).unwrap();
            transfer(&mut cc, PACKETS);
        })
    });
}

pub fn bandwidth_sampler_benchmark(c: &mut Criterion) {
    c.bench_function("bandwidth sampler", |b| {
        b.iter(|| {
            let mut sampler = BandwidthSampler::new();
            let start = Instant::now();
            for pkt_num in 1..=PACKETS {
                let sent_time = start + Duration::from_millis(pkt_num);
                sampler.on_packet_sent(sent_time, pkt_num, MSS, 10 * MSS, true);
                if pkt_num > 10 {
                    sampler.on_packet_acknowledged(sent_time, pkt_num - 10);
                }
            }
        })
    });
}

pub fn windowed_filter_benchmark(c: &mut Criterion) {
    c.bench_function("windowed max filter", |b| {
        b.iter(|| {
            let mut filter = WindowedMaxFilter::new(10);
            for round in 0..PACKETS {
                filter.update(round * 7919 % 1000, round / 10);
            }
            filter.get_best()
        })
    });
}

criterion_group!(
    benches,
    bbr_transfer_benchmark,
    bandwidth_sampler_benchmark,
    windowed_filter_benchmark
);
criterion_main!(benches);
