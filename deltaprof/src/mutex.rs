// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delta computation for mutex and block contention profiles.

use crate::collections::ProfMap;
use crate::pprof::ProfileBuilder;
use crate::runtime::BlockProfileRecord;
use crate::ProfileError;

/// How the runtime's contention counters relate to real events.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CounterSemantics {
    /// Counters already account for sampling (runtimes from 1.20 on). No
    /// correction is applied to either profile kind.
    PreCorrected,
    /// Only one in `mutex_profile_fraction` contention events was recorded
    /// (runtimes before 1.20). Mutex counters are multiplied back up; block
    /// counters are already in event units.
    Sampled { mutex_profile_fraction: i64 },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Correction {
    Identity,
    Multiply(i64),
}

/// Pre-scales raw contention counters before delta computation. Chosen once
/// when the profiler is built.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MutexProfileScaler {
    correction: Correction,
}

impl MutexProfileScaler {
    pub fn mutex(semantics: CounterSemantics) -> Self {
        let correction = match semantics {
            CounterSemantics::PreCorrected => Correction::Identity,
            CounterSemantics::Sampled {
                mutex_profile_fraction,
            } => Correction::Multiply(mutex_profile_fraction),
        };
        Self { correction }
    }

    pub fn block(_semantics: CounterSemantics) -> Self {
        Self {
            correction: Correction::Identity,
        }
    }

    pub fn scale(&self, count: i64, nanoseconds: f64) -> (i64, f64) {
        match self.correction {
            Correction::Identity => (count, nanoseconds),
            Correction::Multiply(rate) => (count.saturating_mul(rate), nanoseconds * rate as f64),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
struct Contention {
    count: i64,
    nanoseconds: i64,
}

/// Turns cumulative contention records into per-read deltas.
#[derive(Debug, Default)]
pub struct DeltaMutexProfiler {
    m: ProfMap<Contention, Contention>,
}

impl DeltaMutexProfiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits `[contentions, delay_nanoseconds]` deltas for every stack that
    /// waited since the previous call. Cycles are converted to nanoseconds
    /// with `cycles_per_second`. The builder is not finished here.
    pub fn print_count_cycle_profile<B: ProfileBuilder + ?Sized>(
        &mut self,
        b: &mut B,
        scaler: MutexProfileScaler,
        cycles_per_second: i64,
        records: &[BlockProfileRecord],
    ) -> Result<(), ProfileError> {
        let cpu_ghz = cycles_per_second as f64 / 1e9;
        let scaled = |r: &BlockProfileRecord| {
            let (count, nanoseconds) = scaler.scale(r.count, r.cycles as f64 / cpu_ghz);
            Contention {
                count,
                nanoseconds: nanoseconds as i64,
            }
        };

        let mut pending: Vec<(usize, [i64; 2])> = Vec::new();
        pending.try_reserve(records.len())?;
        for r in records {
            let value = scaled(r);
            let entry = self.m.lookup(r.stack(), 0);
            entry.acc.count = entry.acc.count.saturating_add(value.count);
            entry.acc.nanoseconds = entry.acc.nanoseconds.saturating_add(value.nanoseconds);
        }

        // Settle every stack before encoding, as for heap profiles.
        for (i, r) in records.iter().enumerate() {
            let entry = self.m.lookup(r.stack(), 0);
            if entry.acc == Contention::default() {
                continue;
            }
            let count = entry.acc.count.saturating_sub(entry.prev.count);
            let nanoseconds = entry.acc.nanoseconds.saturating_sub(entry.prev.nanoseconds);
            entry.prev = entry.acc;
            entry.acc = Contention::default();

            if count < 0 || nanoseconds < 0 {
                tracing::trace!(
                    count,
                    nanoseconds,
                    "contention counter went backwards, rebaselined"
                );
                continue;
            }
            if count == 0 && nanoseconds == 0 {
                continue;
            }
            pending.push((i, [count, nanoseconds]));
        }

        let mut locs = Vec::new();
        for (i, values) in &pending {
            locs.clear();
            b.append_locs_for_stack(&mut locs, records[*i].stack())?;
            b.sample(values, &locs, 0)?;
        }
        tracing::debug!(samples = pending.len(), tracked_stacks = self.m.len(), "wrote contention profile");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Keeps sample values; fails every sample after the first `fail_after`.
    #[derive(Default)]
    struct Values {
        samples: Vec<Vec<i64>>,
        fail_after: Option<usize>,
    }

    impl ProfileBuilder for Values {
        fn append_locs_for_stack(
            &mut self,
            locs: &mut Vec<u64>,
            stack: &[usize],
        ) -> Result<(), ProfileError> {
            locs.extend(stack.iter().map(|&addr| addr as u64));
            Ok(())
        }

        fn sample(&mut self, values: &[i64], _: &[u64], _: i64) -> Result<(), ProfileError> {
            if self.fail_after.is_some_and(|n| self.samples.len() >= n) {
                return Err(ProfileError::StorageFull);
            }
            self.samples.push(values.to_vec());
            Ok(())
        }
    }

    const IDENTITY: MutexProfileScaler = MutexProfileScaler {
        correction: Correction::Identity,
    };

    #[test]
    fn pre_corrected_counters_are_untouched() {
        for scaler in [
            MutexProfileScaler::mutex(CounterSemantics::PreCorrected),
            MutexProfileScaler::block(CounterSemantics::PreCorrected),
        ] {
            assert_eq!(scaler.scale(239, 1000.5), (239, 1000.5));
        }
    }

    #[test]
    fn sampled_mutex_counters_are_multiplied() {
        let semantics = CounterSemantics::Sampled {
            mutex_profile_fraction: 5,
        };
        assert_eq!(MutexProfileScaler::mutex(semantics).scale(3, 10.0), (15, 50.0));
        assert_eq!(MutexProfileScaler::block(semantics).scale(3, 10.0), (3, 10.0));
    }

    #[test]
    fn saturates_without_a_cycle_rate() {
        let records = [
            BlockProfileRecord::new(1, 100, &[1]),
            BlockProfileRecord::new(1, 100, &[1]),
        ];
        let mut profiler = DeltaMutexProfiler::new();
        let mut b = Values::default();
        profiler
            .print_count_cycle_profile(&mut b, IDENTITY, 0, &records)
            .unwrap();
        assert_eq!(b.samples, [vec![2, i64::MAX]]);

        let semantics = CounterSemantics::Sampled {
            mutex_profile_fraction: i64::MAX,
        };
        assert_eq!(MutexProfileScaler::mutex(semantics).scale(2, 1.0).0, i64::MAX);
    }

    #[test]
    fn failed_encode_does_not_leak_into_next_read() {
        let records: Vec<_> = (1..=10)
            .map(|addr| BlockProfileRecord::new(10, 1000, &[addr]))
            .collect();
        let mut profiler = DeltaMutexProfiler::new();
        let mut failing = Values {
            fail_after: Some(1),
            ..Values::default()
        };
        let result =
            profiler.print_count_cycle_profile(&mut failing, IDENTITY, 1_000_000_000, &records);
        assert!(matches!(result, Err(ProfileError::StorageFull)));

        let more: Vec<_> = (1..=10)
            .map(|addr| BlockProfileRecord::new(15, 1500, &[addr]))
            .collect();
        let mut b = Values::default();
        profiler
            .print_count_cycle_profile(&mut b, IDENTITY, 1_000_000_000, &more)
            .unwrap();
        assert_eq!(b.samples, vec![vec![5, 500]; 10]);
    }
}
