mod compiler;
mod inference;
mod layer_gradients;
mod shape;

use crate::data::{DatasetRegistry, SyntheticDataset};
use crate::nn::{BlockCatalog, CompiledModel, Connection, GraphSnapshot, ModelCompiler, Node};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// 确定性的伪随机数，落在 [-1, 1)
pub(super) fn values(n: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn conn(id: &str, source: (&str, &str), target: (&str, &str)) -> Connection {
    Connection::new(id, source, target)
}

/// DataLoader(mnist) → Flatten → Dense(128, relu) → Dense(10, softmax) → CrossEntropy → Adam
pub(super) fn mnist_mlp_snapshot() -> GraphSnapshot {
    GraphSnapshot::new(
        vec![
            Node::new("data", "DataLoader").with_param("dataset", "mnist"),
            Node::new("flatten", "Flatten"),
            Node::new("hidden", "Dense")
                .with_param("units", 128)
                .with_param("activation", "relu"),
            Node::new("classifier", "Dense")
                .with_param("units", 10)
                .with_param("activation", "softmax"),
            Node::new("loss", "CrossEntropy"),
            Node::new("optimizer", "Adam").with_param("learning_rate", 0.01),
        ],
        vec![
            conn("c1", ("data", "data"), ("flatten", "input")),
            conn("c2", ("flatten", "output"), ("hidden", "input")),
            conn("c3", ("hidden", "output"), ("classifier", "input")),
            conn("c4", ("classifier", "output"), ("loss", "predictions")),
            conn("c5", ("data", "labels"), ("loss", "targets")),
            conn("c6", ("loss", "loss"), ("optimizer", "loss")),
        ],
    )
}

/// 用内置目录与内置数据集编译
pub(super) fn compile_builtin(snapshot: &GraphSnapshot) -> CompiledModel {
    let catalog = BlockCatalog::builtin();
    let registry = DatasetRegistry::builtin();
    ModelCompiler::new(&catalog)
        .with_datasets(&registry)
        .compile(snapshot)
        .expect("夹具图应能编译")
}

/// 与 MNIST 同形状的合成数据
pub(super) fn mnist_source(seed: u64) -> SyntheticDataset {
    SyntheticDataset::from_registry(&DatasetRegistry::builtin(), "mnist", seed)
        .expect("内置注册表中应有 mnist")
}
