//! GPU scheduler
//!
//! Tracks the GPU slot table and answers two questions: which single slot
//! should take the next unit of work (weighted round-robin), and how should
//! an image count be split across slots (proportional to weight). Busy flags
//! are flipped only by the task coordinator's lifecycle hooks.

use crate::config::GpuConfig;
use parking_lot::Mutex;
use serde::Serialize;

/// A logical GPU handle, one-to-one with a physical device at startup
#[derive(Debug, Clone, Serialize)]
pub struct GpuSlot {
    /// Physical device index
    pub device: u32,
    /// Display name shown in the UI
    pub display_name: String,
    /// Configured scheduling weight, at least 1
    pub weight: u32,
    /// Advisory port assigned to the slot's worker
    pub port: u16,
    /// Whether the slot currently runs a sub-task
    pub busy: bool,
    /// Remaining round-robin credit, in `[0, weight]`
    pub current_weight: u32,
}

/// One entry of an assignment list
#[derive(Debug, Clone)]
pub struct Assignment {
    /// The slot receiving the sub-task
    pub slot: GpuSlot,
    /// Images assigned to it, always positive
    pub image_count: u32,
}

struct SchedulerState {
    slots: Vec<GpuSlot>,
    multi_enabled: bool,
    distribute_enabled: bool,
}

/// Weighted GPU scheduler
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    /// Build the slot table from the GPU config document. Slot i gets the
    /// advisory port `base_port + i`.
    pub fn new(config: &GpuConfig, base_port: u16) -> Self {
        let slots = config
            .gpus
            .iter()
            .enumerate()
            .map(|(i, gpu)| GpuSlot {
                device: gpu.device,
                display_name: gpu
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("GPU {}", gpu.device)),
                weight: gpu.weight.max(1),
                port: base_port.saturating_add(i as u16),
                busy: false,
                current_weight: gpu.weight.max(1),
            })
            .collect();
        Self {
            state: Mutex::new(SchedulerState {
                slots,
                multi_enabled: config.enabled,
                distribute_enabled: config.distribute,
            }),
        }
    }

    /// Whether multi-GPU dispatch was enabled in the config
    pub fn multi_enabled(&self) -> bool {
        self.state.lock().multi_enabled
    }

    /// Snapshot of the slot table, in declaration order
    pub fn slots(&self) -> Vec<GpuSlot> {
        self.state.lock().slots.clone()
    }

    /// Weighted round-robin pick of a single slot.
    ///
    /// Chooses the non-busy slot with the highest remaining credit; when
    /// every slot is busy, the highest-credit slot regardless. The chosen
    /// slot's credit is decremented, and once every credit reaches zero all
    /// are refilled to their configured weight. Ties break on declaration
    /// order.
    pub fn pick_one(&self) -> Option<GpuSlot> {
        let mut state = self.state.lock();
        if state.slots.is_empty() {
            return None;
        }

        let index = best_index(&state.slots, |slot| !slot.busy)
            .or_else(|| best_index(&state.slots, |_| true))?;

        state.slots[index].current_weight = state.slots[index].current_weight.saturating_sub(1);
        if state.slots.iter().all(|slot| slot.current_weight == 0) {
            for slot in &mut state.slots {
                slot.current_weight = slot.weight;
            }
        }
        Some(state.slots[index].clone())
    }

    /// Split an image count across slots proportional to weight.
    ///
    /// With distribution disabled, a single image, or a single candidate,
    /// everything goes to the highest-weighted available slot (falling back
    /// to the full table when all are busy; queueing happens worker-side).
    /// Otherwise each of the first N-1 candidates gets
    /// `floor(total * weight / Σweight)` and the last takes the remainder;
    /// zero-count entries are dropped. The returned counts always sum to
    /// `total`.
    pub fn distribute(&self, total: u32) -> Vec<Assignment> {
        let state = self.state.lock();
        if state.slots.is_empty() || total == 0 {
            return Vec::new();
        }

        let available: Vec<&GpuSlot> = state.slots.iter().filter(|slot| !slot.busy).collect();
        let candidates: Vec<&GpuSlot> = if available.is_empty() {
            state.slots.iter().collect()
        } else {
            available
        };

        if !state.distribute_enabled || total <= 1 || candidates.len() <= 1 {
            // First-declared order wins ties, as everywhere in the scheduler.
            let mut best: Option<&GpuSlot> = None;
            for slot in candidates.iter().copied() {
                if best.map_or(true, |b| slot.weight > b.weight) {
                    best = Some(slot);
                }
            }
            return best
                .map(|slot| {
                    vec![Assignment {
                        slot: slot.clone(),
                        image_count: total,
                    }]
                })
                .unwrap_or_default();
        }

        let total_weight: u64 = candidates.iter().map(|slot| slot.weight as u64).sum();
        let mut assignments = Vec::with_capacity(candidates.len());
        let mut assigned: u32 = 0;
        let last = candidates.len() - 1;
        for (i, slot) in candidates.iter().enumerate() {
            let count = if i == last {
                total - assigned
            } else {
                ((total as u64 * slot.weight as u64) / total_weight) as u32
            };
            assigned += count;
            if count > 0 {
                assignments.push(Assignment {
                    slot: (*slot).clone(),
                    image_count: count,
                });
            }
        }
        assignments
    }

    /// Flip a slot's busy flag
    pub fn mark_busy(&self, device: u32, busy: bool) {
        let mut state = self.state.lock();
        if let Some(slot) = state.slots.iter_mut().find(|slot| slot.device == device) {
            slot.busy = busy;
        }
    }
}

/// Index of the highest-credit slot among those passing the filter,
/// first-declared order winning ties
fn best_index<F: Fn(&GpuSlot) -> bool>(slots: &[GpuSlot], filter: F) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, slot) in slots.iter().enumerate() {
        if !filter(slot) {
            continue;
        }
        match best {
            Some(b) if slots[b].current_weight >= slot.current_weight => {}
            _ => best = Some(i),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GpuDeviceConfig;

    fn scheduler(weights: &[u32], distribute: bool) -> Scheduler {
        let config = GpuConfig {
            enabled: true,
            distribute,
            gpus: weights
                .iter()
                .enumerate()
                .map(|(i, w)| GpuDeviceConfig {
                    device: i as u32,
                    name: None,
                    weight: *w,
                })
                .collect(),
        };
        Scheduler::new(&config, 7865)
    }

    fn counts(assignments: &[Assignment]) -> Vec<(u32, u32)> {
        assignments
            .iter()
            .map(|a| (a.slot.device, a.image_count))
            .collect()
    }

    #[test]
    fn distribute_weighted_split() {
        let s = scheduler(&[3, 1], true);
        assert_eq!(counts(&s.distribute(8)), vec![(0, 6), (1, 2)]);
    }

    #[test]
    fn distribute_equal_weights_remainder_to_last() {
        let s = scheduler(&[1, 1, 1], true);
        assert_eq!(counts(&s.distribute(10)), vec![(0, 3), (1, 3), (2, 4)]);
    }

    #[test]
    fn distribute_single_image_goes_to_highest_weight() {
        let s = scheduler(&[2, 1], true);
        assert_eq!(counts(&s.distribute(1)), vec![(0, 1)]);
    }

    #[test]
    fn distribute_disabled_uses_one_slot() {
        let s = scheduler(&[3, 1], false);
        assert_eq!(counts(&s.distribute(8)), vec![(0, 8)]);
    }

    #[test]
    fn distribute_conserves_total_and_never_duplicates() {
        for (weights, total) in [
            (vec![3u32, 1], 8u32),
            (vec![1, 1, 1], 10),
            (vec![5, 1], 2),
            (vec![1, 5], 2),
            (vec![2, 3, 5], 17),
            (vec![7], 13),
        ] {
            let s = scheduler(&weights, true);
            let assignments = s.distribute(total);
            let sum: u32 = assignments.iter().map(|a| a.image_count).sum();
            assert_eq!(sum, total, "weights {:?}", weights);
            assert!(assignments.iter().all(|a| a.image_count > 0));
            let mut devices: Vec<u32> = assignments.iter().map(|a| a.slot.device).collect();
            devices.dedup();
            assert_eq!(devices.len(), assignments.len(), "weights {:?}", weights);
        }
    }

    #[test]
    fn distribute_skips_busy_slots() {
        let s = scheduler(&[3, 1], true);
        s.mark_busy(0, true);
        assert_eq!(counts(&s.distribute(4)), vec![(1, 4)]);
    }

    #[test]
    fn distribute_falls_back_to_full_table_when_all_busy() {
        let s = scheduler(&[3, 1], true);
        s.mark_busy(0, true);
        s.mark_busy(1, true);
        assert_eq!(counts(&s.distribute(8)), vec![(0, 6), (1, 2)]);
    }

    #[test]
    fn pick_one_is_weight_fair_over_full_cycles() {
        let weights = [3u32, 1, 2];
        let s = scheduler(&weights, true);
        let cycle: u32 = weights.iter().sum();

        for rounds in 1..=2u32 {
            let mut picked = vec![0u32; weights.len()];
            for _ in 0..cycle {
                let slot = s.pick_one().unwrap();
                picked[slot.device as usize] += 1;
            }
            for (device, weight) in weights.iter().enumerate() {
                assert_eq!(
                    picked[device], *weight,
                    "round {}: device {} picked {} times",
                    rounds, device, picked[device]
                );
            }
        }
    }

    #[test]
    fn pick_one_prefers_idle_slots() {
        let s = scheduler(&[3, 1], true);
        s.mark_busy(0, true);
        assert_eq!(s.pick_one().unwrap().device, 1);
        // All busy still yields a slot rather than refusing.
        s.mark_busy(1, true);
        assert!(s.pick_one().is_some());
    }

    #[test]
    fn credits_stay_within_bounds() {
        let s = scheduler(&[3, 1], true);
        for _ in 0..20 {
            s.pick_one();
            for slot in s.slots() {
                assert!(slot.current_weight <= slot.weight);
            }
        }
    }
}
