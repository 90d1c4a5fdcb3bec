/*
 * @Date         : 2026-03-06
 * @Description  : Dense（全连接）层
 *
 * 作用于最后一维：输入按 `fan_in` 分行，每行
 * `y[i] = bias[i] + Σ_j x[j] · W[j·units + i]`，再逐行激活。
 *
 * 权重形状 [fan_in, units]，偏置形状 [units]（可关闭）。
 */

use super::{Activation, ForwardCtx, LayerKernel, Trace, accumulate};
use crate::tensor::Tensor;
use ndarray::{Array2, ArrayView2, Axis};

#[derive(Debug, Clone)]
pub struct Dense {
    weight: Tensor,
    bias: Option<Tensor>,
    activation: Activation,
    fan_in: usize,
    units: usize,
}

impl Dense {
    pub fn new(weight: Tensor, bias: Option<Tensor>, activation: Activation) -> Self {
        let (fan_in, units) = (weight.shape()[0], weight.shape()[1]);
        Self {
            weight,
            bias,
            activation,
            fan_in,
            units,
        }
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    fn rows(&self, input: &[f32]) -> usize {
        input.len() / self.fan_in.max(1)
    }

    fn input_view<'a>(&self, input: &'a [f32]) -> ArrayView2<'a, f32> {
        ArrayView2::from_shape((self.rows(input), self.fan_in), input)
            .expect("Dense 输入长度须为 fan_in 的整数倍")
    }
}

impl LayerKernel for Dense {
    fn forward(&self, inputs: &[&[f32]], _ctx: &mut ForwardCtx<'_>) -> (Vec<f32>, Trace) {
        let x = self.input_view(inputs[0]);
        let w = self.weight.view_2d(self.fan_in, self.units);
        let mut y: Array2<f32> = x.dot(&w);
        if let Some(bias) = &self.bias {
            let b = ArrayView2::from_shape((1, self.units), bias.as_slice())
                .expect("Dense 偏置长度须等于 units");
            y += &b;
        }
        let mut output = y.into_raw_vec();
        self.activation.apply_rows(&mut output, self.units);
        (output, Trace::None)
    }

    fn backward(
        &self,
        inputs: &[&[f32]],
        output: &[f32],
        _trace: &Trace,
        grad_out: &[f32],
        grads: &mut [Tensor],
    ) -> Vec<Vec<f32>> {
        let x = self.input_view(inputs[0]);
        let pre = self.activation.backward_rows(output, grad_out, self.units);
        let g = ArrayView2::from_shape((x.nrows(), self.units), pre.as_slice())
            .expect("Dense 输出梯度长度不一致");

        // dW = Xᵀ·G，db = Σ_rows G
        let dw = x.t().dot(&g);
        accumulate(&mut grads[0], &dw.into_raw_vec());
        if self.bias.is_some() {
            let db = g.sum_axis(Axis(0));
            accumulate(&mut grads[1], &db.to_vec());
        }

        // dX = G·Wᵀ
        let w = self.weight.view_2d(self.fan_in, self.units);
        vec![g.dot(&w.t()).into_raw_vec()]
    }

    fn params(&self) -> Vec<&Tensor> {
        std::iter::once(&self.weight).chain(self.bias.as_ref()).collect()
    }

    fn params_mut(&mut self) -> Vec<&mut Tensor> {
        std::iter::once(&mut self.weight)
            .chain(self.bias.as_mut())
            .collect()
    }
}
