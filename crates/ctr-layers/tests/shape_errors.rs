use ctr_layers::prelude::*;

#[test]
fn test_pairwise_layers_need_two_inputs() {
    let single = [Shape::batched(&[1, 4])];
    let mut afm = AFMConfig::new().build().unwrap();
    assert!(afm.build(&single).unwrap_err().is_shape_error());
    let mut outter = OutterProductLayer::new(KernelType::Vec, 1);
    assert!(outter.build(&single).unwrap_err().is_shape_error());
    let mut inner = InnerProductLayer::new(true);
    assert!(inner
        .apply(&[Tensor::ones(&[2, 1, 4])])
        .unwrap_err()
        .is_shape_error());
}

#[test]
fn test_pairwise_layers_reject_mismatched_inputs() {
    let shapes = [Shape::batched(&[1, 4]), Shape::batched(&[1, 5])];
    assert!(InnerProductLayer::new(true)
        .compute_output_shape(&shapes)
        .unwrap_err()
        .is_shape_error());

    let wide_field = [Shape::batched(&[2, 4]), Shape::batched(&[2, 4])];
    let mut afm = AFMConfig::new().build().unwrap();
    assert!(afm.build(&wide_field).unwrap_err().is_shape_error());

    let mut outter = OutterProductLayer::new(KernelType::Mat, 1);
    outter
        .build(&[Shape::batched(&[1, 4]), Shape::batched(&[1, 4])])
        .unwrap();
    let err = outter
        .call(&[Tensor::ones(&[2, 1, 3]), Tensor::ones(&[2, 1, 3])])
        .unwrap_err();
    assert!(err.is_shape_error());
}

#[test]
fn test_rank_checks() {
    let mut fm = FM::new();
    assert!(fm.build(&[Shape::batched(&[4])]).unwrap_err().is_shape_error());
    let mut bi = BiInteractionPooling::new();
    assert!(bi.apply(&[Tensor::ones(&[2, 4])]).unwrap_err().is_shape_error());

    let mut cross = CrossNet::new(2, 0.0, 1).unwrap();
    assert!(cross
        .build(&[Shape::batched(&[3, 4])])
        .unwrap_err()
        .is_shape_error());

    let mut mlp = MLPConfig::new(vec![4]).build().unwrap();
    assert!(mlp.build(&[Shape::new(vec![Some(4)])]).unwrap_err().is_shape_error());
}

#[test]
fn test_cross_net_rejects_other_width_after_build() {
    let mut cross = CrossNet::new(1, 0.0, 1).unwrap();
    cross.build(&[Shape::batched(&[4])]).unwrap();
    assert!(cross
        .call(&[Tensor::ones(&[2, 5])])
        .unwrap_err()
        .is_shape_error());
}

#[test]
fn test_local_activation_unit_shape_errors() {
    let mut unit = LocalActivationUnitConfig::new(vec![4]).build().unwrap();
    let wrong_query = [Shape::batched(&[2, 4]), Shape::batched(&[5, 4])];
    assert!(unit.build(&wrong_query).unwrap_err().is_shape_error());

    let wrong_dim = [Shape::batched(&[1, 4]), Shape::batched(&[5, 3])];
    assert!(unit.build(&wrong_dim).unwrap_err().is_shape_error());

    let one_input = [Shape::batched(&[1, 4])];
    assert!(unit.build(&one_input).unwrap_err().is_shape_error());
    assert!(!unit.is_built());
}

#[test]
fn test_weighted_layers_fail_before_build() {
    let x = Tensor::ones(&[2, 4]);
    let cross = CrossNet::new(1, 0.0, 1).unwrap();
    assert!(matches!(
        cross.call(&[x.clone()]).unwrap_err(),
        LayerError::NotBuilt { layer: "CrossNet" }
    ));
    let mlp = MLPConfig::new(vec![2]).build().unwrap();
    assert!(matches!(
        mlp.call(&[x]).unwrap_err(),
        LayerError::NotBuilt { .. }
    ));
}

#[test]
fn test_invalid_hyperparameters() {
    assert!(matches!(
        CrossNet::new(1, -1.0, 1).unwrap_err(),
        LayerError::ConfigError { .. }
    ));
    assert!(MLPConfig::new(vec![4, 0]).build().is_err());
    assert!(MLPConfig::new(vec![4]).with_keep_prob(1.5).build().is_err());
    assert!(LocalActivationUnitConfig::new(vec![4])
        .with_keep_prob(0.0)
        .build()
        .is_err());
    assert!(matches!(
        "tensor".parse::<KernelType>().unwrap_err(),
        LayerError::ConfigError { .. }
    ));
    assert!(Activation::from_name("swishy").is_err());
}

#[test]
fn test_unknown_kernel_type_in_json_is_config_error() {
    let json = r#"{"class_name":"OutterProductLayer","config":{"kernel_type":"tensor","seed":1024}}"#;
    let err = LayerConfig::from_json(json).unwrap_err();
    assert!(matches!(err, LayerError::ConfigError { .. }), "{:?}", err);

    // same variant as parsing the name directly
    let direct = "tensor".parse::<KernelType>().unwrap_err();
    assert!(matches!(direct, LayerError::ConfigError { .. }));
}

#[test]
fn test_error_messages_name_the_layer() {
    let mut afm = AFMConfig::new().build().unwrap();
    let message = afm.build(&[Shape::batched(&[1, 4])]).unwrap_err().to_string();
    assert!(message.starts_with("AFMLayer:"), "{}", message);
    assert!(message.contains("at least 2 inputs"), "{}", message);
}
