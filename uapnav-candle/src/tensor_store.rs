//! Batch containers used by the candle-backed rollout buffer.
use crate::{DiscreteAct, SensorObs};
use candle_core::Tensor;
use uapnav_core::BatchStore;

/// Time-indexed slots holding one cloneable batch each.
pub struct SlotStore<T> {
    slots: Vec<Option<T>>,
}

impl<T: Clone> BatchStore for SlotStore<T> {
    type Batch = T;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
        }
    }

    fn write(&mut self, t: usize, batch: &Self::Batch) {
        self.slots[t] = Some(batch.clone());
    }

    fn get(&self, t: usize) -> Option<&Self::Batch> {
        self.slots[t].as_ref()
    }

    fn copy_within(&mut self, src: usize, dst: usize) {
        self.slots[dst] = self.slots[src].clone();
    }

    fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// Observation slots.
pub type SensorStore = SlotStore<SensorObs>;

/// Action slots.
pub type ActStore = SlotStore<DiscreteAct>;

/// Raw tensor slots, used for recurrent hidden states.
pub type TensorStore = SlotStore<Tensor>;
