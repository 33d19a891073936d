//! Time-major batch containers backing the rollout buffer.

/// Fixed-capacity, time-indexed storage for one field of a rollout.
///
/// Slots are lazily shaped: a slot holds nothing until the first write, so
/// implementations do not need shape information up front (the tensor-backed
/// containers in `uapnav-candle` infer shapes from the first batch).
pub trait BatchStore {
    /// One timestep of data, batched over environments.
    type Batch: Clone;

    /// Allocates storage with `capacity` timestep slots.
    fn with_capacity(capacity: usize) -> Self;

    /// Writes a batch into slot `t`.
    fn write(&mut self, t: usize, batch: &Self::Batch);

    /// Reads the batch in slot `t`, if written.
    fn get(&self, t: usize) -> Option<&Self::Batch>;

    /// Copies slot `src` into slot `dst`.
    fn copy_within(&mut self, src: usize, dst: usize);

    /// Number of timestep slots.
    fn capacity(&self) -> usize;
}

/// Plain `Vec<f32>` batches; the reference container used in core tests.
pub struct VecStore {
    slots: Vec<Option<Vec<f32>>>,
}

impl BatchStore for VecStore {
    type Batch = Vec<f32>;

    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
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

/// The empty container, for policies without recurrent state.
impl BatchStore for () {
    type Batch = ();

    fn with_capacity(_capacity: usize) -> Self {}

    fn write(&mut self, _t: usize, _batch: &Self::Batch) {}

    fn get(&self, _t: usize) -> Option<&Self::Batch> {
        Some(&())
    }

    fn copy_within(&mut self, _src: usize, _dst: usize) {}

    fn capacity(&self) -> usize {
        0
    }
}
