//! Navigation agent and perturbation attacks implemented with
//! [candle](https://crates.io/crates/candle-core).
pub mod attack;
pub mod model;
mod obs;
pub mod opt;
pub mod ppo;
mod tensor_store;
pub mod util;
use serde::{Deserialize, Serialize};
pub use obs::{DiscreteAct, SensorObs};
pub use tensor_store::{ActStore, SensorStore, SlotStore, TensorStore};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support
/// serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl From<candle_core::Device> for Device {
    fn from(device: candle_core::Device) -> Self {
        match device {
            candle_core::Device::Cpu => Self::Cpu,
            _ => unimplemented!(),
        }
    }
}

impl From<Device> for candle_core::Device {
    fn from(device: Device) -> Self {
        match device {
            Device::Cpu => candle_core::Device::Cpu,
            Device::Cuda(n) => candle_core::Device::new_cuda(n).unwrap(),
        }
    }
}
