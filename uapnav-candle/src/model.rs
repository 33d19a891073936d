//! Recurrent actor-critic model over multi-sensor observations.
use crate::{
    obs::SensorObs,
    opt::{Optimizer, OptimizerConfig},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor, D};
use candle_nn::{
    conv::Conv2dConfig,
    conv2d, linear,
    rnn::{gru, GRUConfig, GRUState, GRU, RNN},
    Conv2d, Linear, Module, VarBuilder, VarMap,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
/// Configuration of [`NavPolicyModel`].
pub struct NavPolicyModelConfig {
    /// Name of the image-like sensor fed to the CNN.
    pub depth_sensor: String,

    /// Name of the goal-vector sensor.
    pub goal_sensor: String,

    /// Height and width of the depth sensor.
    pub depth_shape: [usize; 2],

    /// Dimension of the goal vector.
    pub goal_dim: usize,

    /// Dimension of the goal embedding.
    pub goal_embed_dim: usize,

    /// Dimension of the recurrent hidden state.
    pub hidden_dim: usize,

    /// Number of discrete actions.
    pub n_actions: usize,

    /// Optimizer.
    pub opt_config: OptimizerConfig,
}

impl Default for NavPolicyModelConfig {
    fn default() -> Self {
        Self {
            depth_sensor: "depth".to_string(),
            goal_sensor: "pointgoal_with_gps_compass".to_string(),
            depth_shape: [64, 64],
            goal_dim: 2,
            goal_embed_dim: 32,
            hidden_dim: 512,
            n_actions: 4,
            opt_config: OptimizerConfig::default(),
        }
    }
}

impl NavPolicyModelConfig {
    /// Sets the depth sensor shape.
    pub fn depth_shape(mut self, height: usize, width: usize) -> Self {
        self.depth_shape = [height, width];
        self
    }

    /// Sets the hidden state dimension.
    pub fn hidden_dim(mut self, v: usize) -> Self {
        self.hidden_dim = v;
        self
    }

    /// Sets the number of discrete actions.
    pub fn n_actions(mut self, v: usize) -> Self {
        self.n_actions = v;
        self
    }

    /// Sets the optimizer configuration.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Constructs [`NavPolicyModelConfig`] from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`NavPolicyModelConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

fn conv_out(size: usize, kernel: usize, stride: usize) -> usize {
    (size - kernel) / stride + 1
}

fn stride(s: usize) -> Conv2dConfig {
    Conv2dConfig {
        stride: s,
        ..Default::default()
    }
}

/// Recurrent actor-critic for pointgoal navigation.
///
/// The depth image runs through a three-layer CNN, the goal vector through a
/// linear embedding; both are fused and fed to a single-layer GRU whose state
/// is zeroed at episode boundaries via the masks. Actor and critic heads read
/// the GRU output.
pub struct NavPolicyModel {
    device: Device,
    varmap: VarMap,
    config: NavPolicyModelConfig,
    c1: Conv2d,
    c2: Conv2d,
    c3: Conv2d,
    cnn_fc: Linear,
    goal_fc: Linear,
    gru: GRU,
    actor: Linear,
    critic: Linear,
    opt: Optimizer,
}

impl NavPolicyModel {
    /// Constructs [`NavPolicyModel`].
    pub fn build(config: NavPolicyModelConfig, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);

        let [h, w] = config.depth_shape;
        anyhow::ensure!(
            h >= 36 && w >= 36,
            "depth shape {}x{} is below the 36x36 minimum of the conv stack",
            h,
            w
        );
        let (h, w) = (conv_out(h, 8, 4), conv_out(w, 8, 4));
        let (h, w) = (conv_out(h, 4, 2), conv_out(w, 4, 2));
        let (h, w) = (conv_out(h, 3, 1), conv_out(w, 3, 1));
        let cnn_flat = 32 * h * w;

        let c1 = conv2d(1, 32, 8, stride(4), vb.pp("c1"))?;
        let c2 = conv2d(32, 64, 4, stride(2), vb.pp("c2"))?;
        let c3 = conv2d(64, 32, 3, stride(1), vb.pp("c3"))?;
        let cnn_fc = linear(cnn_flat, config.hidden_dim, vb.pp("cnn_fc"))?;
        let goal_fc = linear(config.goal_dim, config.goal_embed_dim, vb.pp("goal_fc"))?;
        let gru = gru(
            config.hidden_dim + config.goal_embed_dim,
            config.hidden_dim,
            GRUConfig::default(),
            vb.pp("gru"),
        )?;
        let actor = linear(config.hidden_dim, config.n_actions, vb.pp("actor"))?;
        let critic = linear(config.hidden_dim, 1, vb.pp("critic"))?;

        let opt = config.opt_config.build(varmap.all_vars())?;

        Ok(Self {
            device,
            varmap,
            config,
            c1,
            c2,
            c3,
            cnn_fc,
            goal_fc,
            gru,
            actor,
            critic,
            opt,
        })
    }

    /// The device the model lives on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The model configuration.
    pub fn config(&self) -> &NavPolicyModelConfig {
        &self.config
    }

    /// A zeroed recurrent state for `batch_size` environments.
    pub fn zero_hidden(&self, batch_size: usize) -> Result<Tensor> {
        Ok(Tensor::zeros(
            (batch_size, self.config.hidden_dim),
            DType::F32,
            &self.device,
        )?)
    }

    /// One step of the policy.
    ///
    /// `hidden` is the `[N, hidden_dim]` recurrent state, `masks` a `[N]`
    /// `f32` tensor that is `0.0` where an episode just ended. Returns action
    /// logits `[N, n_actions]`, value estimates `[N]` and the next hidden
    /// state. Gradients flow back to the observation tensors, which the
    /// perturbation attacks rely on.
    pub fn forward(
        &self,
        obs: &SensorObs,
        hidden: &Tensor,
        masks: &Tensor,
    ) -> Result<(Tensor, Tensor, Tensor)> {
        let depth = obs.sensor(&self.config.depth_sensor)?;
        let goal = obs.sensor(&self.config.goal_sensor)?;

        // Channel-last input, NCHW convolutions.
        let x = depth.to_device(&self.device)?.permute((0, 3, 1, 2))?;
        let x = self.c1.forward(&x)?.relu()?;
        let x = self.c2.forward(&x)?.relu()?;
        let x = self.c3.forward(&x)?.relu()?.flatten_from(1)?;
        let x = self.cnn_fc.forward(&x)?.relu()?;

        let g = self.goal_fc.forward(&goal.to_device(&self.device)?)?.relu()?;
        let x = Tensor::cat(&[x, g], D::Minus1)?;

        let h = hidden.broadcast_mul(&masks.unsqueeze(D::Minus1)?)?;
        let state = self.gru.step(&x, &GRUState { h })?;
        let h = state.h().clone();

        let logits = self.actor.forward(&h)?;
        let values = self.critic.forward(&h)?.squeeze(D::Minus1)?;
        Ok((logits, values, h))
    }

    /// Computes gradients of `loss` and applies one optimization step.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// The variable map holding the parameters.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Saves the parameters as a safetensors file.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Saved policy model to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads parameters from a safetensors file.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Loaded policy model from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn obs(n: usize, shape: [usize; 2]) -> Result<SensorObs> {
        let device = Device::Cpu;
        Ok(SensorObs::new(BTreeMap::from([
            (
                "depth".to_string(),
                Tensor::zeros((n, shape[0], shape[1], 1), DType::F32, &device)?,
            ),
            (
                "pointgoal_with_gps_compass".to_string(),
                Tensor::zeros((n, 2), DType::F32, &device)?,
            ),
        ])))
    }

    #[test]
    fn forward_shapes() -> Result<()> {
        let config = NavPolicyModelConfig::default()
            .depth_shape(64, 64)
            .hidden_dim(16);
        let model = NavPolicyModel::build(config, Device::Cpu)?;
        let obs = obs(3, [64, 64])?;
        let hidden = model.zero_hidden(3)?;
        let masks = Tensor::ones((3,), DType::F32, &Device::Cpu)?;
        let (logits, values, next_hidden) = model.forward(&obs, &hidden, &masks)?;
        assert_eq!(logits.dims(), &[3, 4]);
        assert_eq!(values.dims(), &[3]);
        assert_eq!(next_hidden.dims(), &[3, 16]);
        Ok(())
    }

    #[test]
    fn save_and_load_roundtrip() -> Result<()> {
        use tempdir::TempDir;
        let dir = TempDir::new("nav_policy_model")?;
        let path = dir.path().join("policy.safetensors");
        let config = NavPolicyModelConfig::default().hidden_dim(8);
        let model = NavPolicyModel::build(config.clone(), Device::Cpu)?;
        model.save(&path)?;
        let mut other = NavPolicyModel::build(config, Device::Cpu)?;
        other.load(&path)?;

        let obs = obs(1, [64, 64])?;
        let hidden = model.zero_hidden(1)?;
        let masks = Tensor::ones((1,), DType::F32, &Device::Cpu)?;
        let (a, _, _) = model.forward(&obs, &hidden, &masks)?;
        let (b, _, _) = other.forward(&obs, &hidden, &masks)?;
        let diff = (a - b)?.abs()?.sum_all()?.to_vec0::<f32>()?;
        assert!(diff < 1e-6);
        Ok(())
    }
}
