/*
 * @Date         : 2026-03-10
 * @Description  : 执行器：CompiledModel 的前向与反向传播
 *
 * - `forward`: 推理模式，纯函数（相同权重 + 相同输入 ⇒ 逐位相同的输出）
 * - `forward_train`: 训练模式前向（Dropout 生效），记录反向传播所需的 `Tape`
 * - `backward`: 沿层序逆序做反向模式求导，得到每层参数梯度与输入梯度
 *
 * 所有缓冲区都是单个样本展平后的数据。
 */

use super::layer::{ForwardCtx, LayerKernel, Trace};
use super::model::{CompiledModel, Feed};
use crate::errors::ExecError;
use crate::tensor::Tensor;
use rand::rngs::StdRng;

/// 训练前向的记录
#[derive(Debug, Clone)]
pub struct Tape {
    input: Vec<f32>,
    outputs: Vec<Vec<f32>>,
    traces: Vec<Trace>,
    output_layer: usize,
}

impl Tape {
    /// 模型输出
    pub fn output(&self) -> &[f32] {
        &self.outputs[self.output_layer]
    }

    /// 第`index`层的输出
    pub fn layer_output(&self, index: usize) -> Option<&[f32]> {
        self.outputs.get(index).map(Vec::as_slice)
    }
}

/// 一次反向传播的结果
#[derive(Debug, Clone)]
pub struct Gradients {
    /// 与每层 `params()` 一一对应
    pub layers: Vec<Vec<Tensor>>,
    /// 损失对模型输入的梯度
    pub input: Vec<f32>,
}

impl Gradients {
    /// 与模型参数同形状的全零梯度
    pub fn zeros_like(model: &CompiledModel) -> Self {
        Self {
            layers: model.layers.iter().map(|l| l.kind.zero_grads()).collect(),
            input: vec![0.0; model.input_size()],
        }
    }

    /// 逐元素累加另一份梯度
    pub fn accumulate(&mut self, other: &Gradients) {
        for (mine, theirs) in self.layers.iter_mut().zip(&other.layers) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                a.scaled_add(1.0, b);
            }
        }
        for (a, b) in self.input.iter_mut().zip(&other.input) {
            *a += b;
        }
    }

    pub fn scale(&mut self, factor: f32) {
        self.layers.iter_mut().flatten().for_each(|t| t.scale(factor));
        self.input.iter_mut().for_each(|x| *x *= factor);
    }

    /// 所有参数梯度的 L2 范数
    pub fn norm(&self) -> f32 {
        self.layers
            .iter()
            .flatten()
            .map(Tensor::sum_squares)
            .sum::<f32>()
            .sqrt()
    }
}

impl CompiledModel {
    fn check_input(&self, input: &[f32]) -> Result<(), ExecError> {
        let expected = self.input_size();
        if input.len() != expected {
            return Err(ExecError::InputSizeMismatch {
                expected,
                got: input.len(),
            });
        }
        Ok(())
    }

    fn run(&self, input: &[f32], ctx: &mut ForwardCtx<'_>) -> (Vec<Vec<f32>>, Vec<Trace>) {
        let mut outputs: Vec<Vec<f32>> = Vec::with_capacity(self.layers.len());
        let mut traces = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let inputs: Vec<&[f32]> = layer
                .inputs
                .iter()
                .map(|feed| match *feed {
                    Feed::ModelInput => input,
                    Feed::Layer(i) => outputs[i].as_slice(),
                })
                .collect();
            let (output, trace) = layer.kind.forward(&inputs, ctx);
            outputs.push(output);
            traces.push(trace);
        }
        (outputs, traces)
    }

    /// 推理模式前向传播（不修改任何权重）
    pub fn forward(&self, input: &[f32]) -> Result<Vec<f32>, ExecError> {
        self.check_input(input)?;
        let (mut outputs, _) = self.run(input, &mut ForwardCtx::inference());
        Ok(outputs.swap_remove(self.output_layer))
    }

    /// 训练模式前向传播
    pub fn forward_train(&self, input: &[f32], rng: &mut StdRng) -> Result<Tape, ExecError> {
        self.check_input(input)?;
        let (outputs, traces) = self.run(input, &mut ForwardCtx::training(rng));
        Ok(Tape {
            input: input.to_vec(),
            outputs,
            traces,
            output_layer: self.output_layer,
        })
    }

    /// 反向传播
    ///
    /// # 参数
    /// - `tape`: 本模型 `forward_train` 的记录
    /// - `grad_output`: 损失对模型输出的梯度
    pub fn backward(&self, tape: &Tape, grad_output: &[f32]) -> Result<Gradients, ExecError> {
        if tape.outputs.len() != self.layers.len() || tape.output_layer != self.output_layer {
            return Err(ExecError::TapeMismatch);
        }
        let expected = tape.output().len();
        if grad_output.len() != expected {
            return Err(ExecError::GradSizeMismatch {
                expected,
                got: grad_output.len(),
            });
        }

        let mut grads = Gradients::zeros_like(self);
        // 每层输出的梯度，未被触及的层保持 None
        let mut upstream: Vec<Option<Vec<f32>>> = vec![None; self.layers.len()];
        upstream[self.output_layer] = Some(grad_output.to_vec());

        for layer in self.layers.iter().rev() {
            let Some(grad_out) = upstream[layer.index].take() else {
                continue;
            };
            let inputs: Vec<&[f32]> = layer
                .inputs
                .iter()
                .map(|feed| match *feed {
                    Feed::ModelInput => tape.input.as_slice(),
                    Feed::Layer(i) => tape.outputs[i].as_slice(),
                })
                .collect();
            let input_grads = layer.kind.backward(
                &inputs,
                &tape.outputs[layer.index],
                &tape.traces[layer.index],
                &grad_out,
                &mut grads.layers[layer.index],
            );
            for (feed, grad) in layer.inputs.iter().zip(input_grads) {
                let target = match *feed {
                    Feed::ModelInput => &mut grads.input,
                    Feed::Layer(i) => upstream[i].get_or_insert_with(|| vec![0.0; grad.len()]),
                };
                for (acc, g) in target.iter_mut().zip(&grad) {
                    *acc += g;
                }
            }
        }
        Ok(grads)
    }
}
