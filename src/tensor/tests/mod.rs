use crate::tensor::{Tensor, xavier_limit};
use approx::assert_abs_diff_eq;
use ndarray::{Array, IxDyn};
use rand::SeedableRng;
use rand::rngs::StdRng;

#[test]
fn test_new_and_shape() {
    let tensor = Tensor::new(&[1., 2., 3., 4., 5., 6.], &[2, 3]);
    assert_eq!(tensor.shape(), &[2, 3]);
    assert_eq!(tensor.size(), 6);
    assert_eq!(
        tensor.data,
        Array::from_shape_vec(IxDyn(&[2, 3]), vec![1., 2., 3., 4., 5., 6.]).unwrap()
    );
}

#[test]
#[should_panic]
fn test_new_invalid_shape() {
    let _ = Tensor::new(&[1., 2.], &[1, 1, 1]);
}

#[test]
fn test_zeros_and_filled() {
    let zeros = Tensor::zeros(&[4]);
    assert_eq!(zeros.as_slice(), &[0.0; 4]);

    let ones = Tensor::filled(1.0, &[2, 2]);
    assert_eq!(ones.as_slice(), &[1.0; 4]);
}

#[test]
fn test_empty_tensor() {
    // 无偏置的层用长度为 0 的张量表示
    let empty = Tensor::zeros(&[0]);
    assert!(empty.is_empty());
    assert_eq!(empty.sum_squares(), 0.0);
}

#[test]
fn test_xavier_within_limit_and_seeded() {
    let limit = xavier_limit(784, 128);
    assert_abs_diff_eq!(limit, (6.0f32 / 912.0).sqrt(), epsilon = 1e-7);

    let mut rng1 = StdRng::seed_from_u64(7);
    let mut rng2 = StdRng::seed_from_u64(7);
    let t1 = Tensor::new_xavier(784, 128, &[784, 128], &mut rng1);
    let t2 = Tensor::new_xavier(784, 128, &[784, 128], &mut rng2);

    // 相同种子 => 完全相同的权重
    assert_eq!(t1, t2);
    assert!(t1.as_slice().iter().all(|w| w.abs() <= limit));
}

#[test]
fn test_view_2d_and_inplace_ops() {
    let mut t = Tensor::new(&[1., 2., 3., 4.], &[4]);
    let view = t.view_2d(2, 2);
    assert_eq!(view[[1, 0]], 3.0);

    let other = Tensor::new(&[1., 1., 1., 1.], &[4]);
    t.scaled_add(-0.5, &other);
    assert_eq!(t.as_slice(), &[0.5, 1.5, 2.5, 3.5]);

    t.scale(2.0);
    assert_eq!(t.as_slice(), &[1.0, 3.0, 5.0, 7.0]);
    assert_abs_diff_eq!(t.sum_squares(), 84.0);
}
