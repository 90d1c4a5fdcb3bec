/*
 * @Date         : 2026-03-09
 * @Description  : 编译产物：CompiledLayer / CompiledModel
 *
 * 每个 CompiledLayer 独占自己的权重张量，只有训练器的更新步骤会修改它们；
 * 重新编译时整体替换。
 */

use super::catalog::Params;
use super::layer::{LayerKernel, LayerKind};
use super::shape::TensorShape;
use serde::Serialize;

/// 层输入的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Feed {
    /// 模型输入
    ModelInput,
    /// 之前编译的某一层（按层序号）
    Layer(usize),
}

#[derive(Debug, Clone)]
pub struct CompiledLayer {
    pub index: usize,
    pub node_id: String,
    pub block_type: String,
    pub kind: LayerKind,
    /// 输入来源；Add/Concatenate 有多个
    pub inputs: Vec<Feed>,
    pub input_shape: TensorShape,
    pub output_shape: TensorShape,
    pub param_count: usize,
    /// 生效参数（默认值叠加覆盖值）
    pub params: Params,
}

impl CompiledLayer {
    /// 单个样本的输出长度
    pub fn output_size(&self) -> usize {
        self.output_shape.sample_size().unwrap_or(0)
    }

    pub fn is_weight_bearing(&self) -> bool {
        self.kind.is_weight_bearing()
    }

    /// 摘要中展示的前两个参数，如 `units=128, activation=relu`
    fn brief_params(&self) -> String {
        self.params
            .iter()
            .take(2)
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// 参数表中的一行
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub index: usize,
    pub node_id: String,
    pub layer_type: String,
    pub output_shape: String,
    pub params: usize,
}

#[derive(Debug, Clone)]
pub struct CompiledModel {
    /// 拓扑序
    pub layers: Vec<CompiledLayer>,
    pub input_shape: TensorShape,
    pub output_shape: TensorShape,
    pub total_params: usize,
    /// 复杂度评分，落在 [0.5, 5.0]
    pub complexity: f32,
    pub cycle_detected: bool,
    /// 输出层序号（没有被其他层消费的最后一层）
    pub(crate) output_layer: usize,
}

impl CompiledModel {
    /// 单个样本的输入长度
    pub fn input_size(&self) -> usize {
        self.input_shape.sample_size().unwrap_or(0)
    }

    pub fn output_size(&self) -> usize {
        self.output_shape.sample_size().unwrap_or(0)
    }

    pub fn output_layer(&self) -> usize {
        self.output_layer
    }

    pub fn weight_bearing_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_weight_bearing()).count()
    }

    /// 参数表（可序列化，供界面展示）
    pub fn parameter_table(&self) -> Vec<LayerSummary> {
        self.layers
            .iter()
            .map(|layer| LayerSummary {
                index: layer.index,
                node_id: layer.node_id.clone(),
                layer_type: layer.block_type.clone(),
                output_shape: layer.output_shape.to_string(),
                params: layer.kind.param_count(),
            })
            .collect()
    }

    /// 打印模型摘要
    pub fn print_summary(&self) {
        println!("{}", self.summary());
    }

    /// 模型摘要（Unicode 文本表格）
    ///
    /// ```text
    /// ┌──────┬─────────┬──────────────────────────────┬──────────────┬─────────┐
    /// │ #    │ 类型    │ 参数                         │ 输出形状     │  参数量 │
    /// ├──────┼─────────┼──────────────────────────────┼──────────────┼─────────┤
    /// │ 0    │ Flatten │                              │ (batch, 784) │       0 │
    /// │ 1    │ Dense   │ units=128, activation=relu   │ (batch, 128) │ 100,480 │
    /// │ 2    │ Dense   │ units=10, activation=softmax │ (batch, 10)  │   1,290 │
    /// └──────┴─────────┴──────────────────────────────┴──────────────┴─────────┘
    /// 层数: 3  可训练层: 2  总参数量: 101,770  复杂度: 2.58
    /// ```
    pub fn summary(&self) -> String {
        let rows: Vec<[String; 5]> = self
            .layers
            .iter()
            .map(|layer| {
                [
                    layer.index.to_string(),
                    layer.block_type.clone(),
                    layer.brief_params(),
                    layer.output_shape.to_string(),
                    format_number(layer.param_count),
                ]
            })
            .collect();
        let headers = ["#", "类型", "参数", "输出形状", "参数量"];
        let widths: Vec<usize> = (0..5)
            .map(|col| {
                rows.iter()
                    .map(|row| display_width(&row[col]))
                    .chain(std::iter::once(display_width(headers[col])))
                    .max()
                    .unwrap_or(0)
                    .max(4)
            })
            .collect();
        let rule = |left: &str, mid: &str, right: &str| {
            let cells: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
            format!("{left}{}{right}\n", cells.join(mid))
        };
        let line = |cells: &[String]| {
            let cells: Vec<String> = cells
                .iter()
                .zip(&widths)
                .enumerate()
                .map(|(col, (cell, w))| {
                    let pad = " ".repeat(w - display_width(cell));
                    // 参数量右对齐
                    if col == 4 {
                        format!(" {pad}{cell} ")
                    } else {
                        format!(" {cell}{pad} ")
                    }
                })
                .collect();
            format!("│{}│\n", cells.join("│"))
        };

        let mut output = rule("┌", "┬", "┐");
        output.push_str(&line(&headers.map(String::from)));
        output.push_str(&rule("├", "┼", "┤"));
        for row in &rows {
            output.push_str(&line(row));
        }
        output.push_str(&rule("└", "┴", "┘"));
        output.push_str(&format!(
            "层数: {}  可训练层: {}  总参数量: {}  复杂度: {:.2}\n",
            self.layers.len(),
            self.weight_bearing_layers(),
            format_number(self.total_params),
            self.complexity
        ));
        output
    }
}

/// 千分位分隔
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// 终端显示宽度（CJK 字符占两格）
fn display_width(s: &str) -> usize {
    s.chars()
        .map(|c| if (c as u32) >= 0x1100 && !c.is_ascii() { 2 } else { 1 })
        .sum()
}

/// 复杂度评分：`1 + Σ 0.5·log10(1 + size)`，每个 Dropout 减 0.2，截断到 [0.5, 5.0]
///
/// `size` 取 Dense/LSTM 的 `units`、Conv2D 的 `filters`、MultiHeadAttention 的 `dim`
pub fn complexity_score<'a>(layers: impl IntoIterator<Item = (&'a str, &'a Params)>) -> f32 {
    let mut score = 1.0f32;
    for (block_type, params) in layers {
        let size = match block_type {
            "Dense" | "LSTM" => params.usize("units"),
            "Conv2D" => params.usize("filters"),
            "MultiHeadAttention" => params.usize("dim"),
            "Dropout" => {
                score -= 0.2;
                None
            }
            _ => None,
        };
        if let Some(size) = size {
            score += 0.5 * (1.0 + size as f32).log10();
        }
    }
    score.clamp(0.5, 5.0)
}
