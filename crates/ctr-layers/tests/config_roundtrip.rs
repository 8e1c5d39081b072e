use ctr_layers::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_tensor(rng: &mut StdRng, shape: &[usize]) -> Tensor {
    let n = shape.iter().product();
    let data = (0..n).map(|_| rng.gen_range(-1.0f32..1.0)).collect();
    Tensor::from_data(shape, data).unwrap()
}

/// Exports `layer`, rebuilds it from JSON, reloads the weights and checks the
/// outputs match.
fn assert_rebuild_reproduces(layer: &mut dyn Layer, inputs: &[Tensor]) {
    let expected = layer.apply(inputs).unwrap();
    let json = layer.get_config().to_json().unwrap();

    let mut rebuilt = LayerConfig::from_json(&json).unwrap().into_layer().unwrap();
    assert_eq!(rebuilt.name(), layer.name());
    let shapes: Vec<Shape> = inputs.iter().map(|t| Shape::of(t.shape())).collect();
    rebuilt.build(&shapes).unwrap();
    rebuilt.set_weights(&layer.get_weights()).unwrap();
    assert_eq!(rebuilt.call(inputs).unwrap(), expected, "{}", json);
}

#[test]
fn test_rebuild_every_layer_from_json() {
    let mut rng = StdRng::seed_from_u64(31);
    let fields = random_tensor(&mut rng, &[4, 3, 5]);
    let split: Vec<Tensor> = (0..3).map(|f| fields.select(1, &[f]).unwrap()).collect();
    let flat = random_tensor(&mut rng, &[4, 6]);
    let query = random_tensor(&mut rng, &[4, 1, 5]);

    assert_rebuild_reproduces(&mut FM::new(), &[fields.clone()]);
    assert_rebuild_reproduces(&mut BiInteractionPooling::new(), &[fields]);
    assert_rebuild_reproduces(&mut InnerProductLayer::new(false), &split);
    for kernel_type in [KernelType::Mat, KernelType::Vec, KernelType::Num] {
        assert_rebuild_reproduces(&mut OutterProductLayer::new(kernel_type, 77), &split);
    }
    assert_rebuild_reproduces(&mut CrossNet::new(3, 0.01, 5).unwrap(), &[flat.clone()]);
    assert_rebuild_reproduces(
        &mut MLPConfig::new(vec![4, 2])
            .with_activation(ActivationKind::Tanh.into())
            .with_bn(true)
            .build()
            .unwrap(),
        &[flat.clone()],
    );
    assert_rebuild_reproduces(
        &mut AFMConfig::new().with_keep_prob(0.5).build().unwrap(),
        &split,
    );
    assert_rebuild_reproduces(
        &mut LocalActivationUnitConfig::new(vec![6]).build().unwrap(),
        &[query, split[0].repeat(1, 4).unwrap()],
    );
    assert_rebuild_reproduces(&mut PredictionConfig::new().build(), &[flat]);
}

#[test]
fn test_weights_survive_training_step() {
    let mut rng = StdRng::seed_from_u64(37);
    let x = random_tensor(&mut rng, &[8, 4]);
    let mut mlp = MLPConfig::new(vec![3]).with_bn(true).build().unwrap();
    mlp.apply(&[x.clone()]).unwrap();
    // moves the batch norm moving statistics
    mlp.call_train(&[x.clone()]).unwrap();

    let mut rebuilt = LayerConfig::from_json(&mlp.get_config().to_json().unwrap())
        .unwrap()
        .into_layer()
        .unwrap();
    rebuilt.build(&[Shape::batched(&[4])]).unwrap();
    assert_ne!(rebuilt.call(&[x.clone()]).unwrap(), mlp.call(&[x.clone()]).unwrap());
    rebuilt.set_weights(&mlp.get_weights()).unwrap();
    assert_eq!(rebuilt.call(&[x.clone()]).unwrap(), mlp.call(&[x]).unwrap());
}

#[test]
fn test_config_json_is_keras_layout() {
    let json = LayerConfig::CrossNet(CrossNetConfig::new(2)).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["class_name"], "CrossNet");
    assert_eq!(value["config"]["layer_num"], 2);
    assert_eq!(value["config"]["seed"], 1024);

    let json = LayerConfig::MLP(MLPConfig::new(vec![16])).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["config"]["activation"], "relu");
    assert_eq!(value["config"]["hidden_size"], serde_json::json!([16]));
}

#[test]
fn test_set_weights_rejects_wrong_count_and_shape() {
    let mut cross = CrossNet::new(2, 0.0, 1).unwrap();
    cross.build(&[Shape::batched(&[3])]).unwrap();
    assert_eq!(cross.weights().len(), 4);

    let err = cross.set_weights(&[Tensor::zeros(&[3, 1])]).unwrap_err();
    assert!(err.is_shape_error());

    let err = cross
        .set_weights(&vec![Tensor::zeros(&[1, 3]); 4])
        .unwrap_err();
    assert!(matches!(err, LayerError::ShapeMismatch { .. }));
}
