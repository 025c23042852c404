// End-to-end tests for `ArgumentEngine::handle`.
//
// Each test builds an engine from declared providers the way an operator
// would, calls `handle` with partial input, and checks the derived mapping:
// - deterministic output and declaration order
// - halo offsets added exactly once to supplied ends
// - dimension sizes reduced over every participating array
// - stepping/time dimension propagation
// - autotune eligibility and tile sizes
// - rejection paths (unknown names, failed checks, unresolvable extents)

use indexmap::IndexMap;
use kargs::check::Check;
use kargs::provider::{Constant, Dimension, Function, Object, Scalar, TempArray};
use kargs::stencil::Stencil;
use kargs::tiling::{SizingFn, TileSize, TilingArgument};
use kargs::value::{ArrayValue, CompositeValue, DType, Handle};
use kargs::{ArgError, ArgumentEngine, EngineOptions, Reducer, Value};

// ── Test helpers ────────────────────────────────────────────────────────────

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn input(pairs: &[(&str, Value)]) -> IndexMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn int(v: i64) -> Value {
    Value::Int(v)
}

fn array(shape: &[usize]) -> Value {
    Value::Array(ArrayValue::new(DType::Float32, shape.to_vec()))
}

/// Acoustic-style operator: a time-stepped wavefield `u(t, x, y)`, a static
/// velocity model `m(x, y)`, a damping constant and a blocked `x` loop.
fn acoustic(tile: TileSize) -> ArgumentEngine {
    ArgumentEngine::new(
        &[
            Stencil::new().with("x", &[-2, -1, 0, 1, 2]).with("y", &[-2, 0, 2]),
            Stencil::new().with("t", &[-1, 0, 1]),
        ],
        vec![
            Dimension::time("time").into(),
            Dimension::stepping("t", "time").into(),
            Dimension::space("x").into(),
            Dimension::space("y").into(),
            Function::new("u", DType::Float32, &["t", "x", "y"])
                .with_shape(&[3, 40, 30])
                .into(),
            Function::new("m", DType::Float32, &["x", "y"])
                .with_shape(&[40, 30])
                .into(),
            Constant::new("damp", DType::Float32, 0.5).into(),
            Scalar::new("dt", DType::Float32).with_default(0.001).into(),
            Object {
                name: "timers".into(),
                value: Handle { addr: 0xbeef },
            }
            .into(),
        ],
        vec![TilingArgument::new("x0_blk", "x", tile)],
    )
}

// ── Determinism and order ───────────────────────────────────────────────────

#[test]
fn handle_is_deterministic() {
    init_logging();
    let engine = acoustic(TileSize::Extent);
    let a = engine.handle(input(&[("time_e", int(10))]), true).unwrap();
    for _ in 0..5 {
        let b = engine.handle(input(&[("time_e", int(10))]), true).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn arguments_follow_declaration_order() {
    let engine = acoustic(TileSize::Extent);
    let inv = engine.handle(IndexMap::new(), false).unwrap();
    let names: Vec<&str> = inv.arguments.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            "u", "m", "t_size", "t_s", "t_e", "x_size", "x_s", "x_e", "y_size", "y_s", "y_e",
            "x0_blk_size", "x0_blk_s", "x0_blk_e", "time_size", "time_s", "time_e", "damp",
            "dt", "timers",
        ]
    );
    assert_eq!(names, engine.argument_names().collect::<Vec<_>>());
}

#[test]
fn every_argument_is_resolved() {
    let inv = acoustic(TileSize::Extent)
        .handle(IndexMap::new(), false)
        .unwrap();
    assert_eq!(inv.get("u"), Some(&array(&[3, 40, 30])));
    assert_eq!(inv.get("damp"), Some(&Value::Float(0.5)));
    assert_eq!(inv.get("dt"), Some(&Value::Float(0.001)));
    assert_eq!(inv.get("timers"), Some(&Value::Handle(Handle { addr: 0xbeef })));
}

// ── Halo offsets ────────────────────────────────────────────────────────────

#[test]
fn halo_offset_is_added_once() {
    let engine = ArgumentEngine::new(
        &[Stencil::new().with("x", &[-1, 0, 2])],
        vec![Function::new("u", DType::Float32, &["x"]).with_shape(&[100]).into()],
        Vec::new(),
    );
    let inv = engine.handle(input(&[("x_e", int(50))]), false).unwrap();
    assert_eq!(inv.get("x_e"), Some(&int(52)));

    // A second call starts from the raw input again.
    let inv = engine.handle(input(&[("x_e", int(50))]), false).unwrap();
    assert_eq!(inv.get("x_e"), Some(&int(52)));
}

#[test]
fn halo_offset_takes_the_widest_stencil() {
    let engine = acoustic(TileSize::Extent);
    assert_eq!(engine.offsets().get("x_e"), Some(&2));
    assert_eq!(engine.offsets().get("y_e"), Some(&2));
    assert_eq!(engine.offsets().get("t_e"), Some(&1));
    let inv = engine.handle(input(&[("y_e", int(20))]), false).unwrap();
    assert_eq!(inv.get("y_e"), Some(&int(22)));
}

// ── Dimension sizes ─────────────────────────────────────────────────────────

#[test]
fn shared_dimension_takes_largest_shape() {
    let engine = ArgumentEngine::new(
        &[],
        vec![
            Function::new("a", DType::Float32, &["x"]).with_shape(&[10]).into(),
            Function::new("b", DType::Float32, &["x"]).with_shape(&[14]).into(),
        ],
        Vec::new(),
    );
    let inv = engine.handle(IndexMap::new(), false).unwrap();
    assert_eq!(inv.get("x_size"), Some(&int(14)));
}

#[test]
fn reducer_is_configurable() {
    let providers = vec![
        Function::new("a", DType::Float32, &["x"]).with_shape(&[10]).into(),
        Function::new("b", DType::Float32, &["x"]).with_shape(&[14]).into(),
    ];
    let engine = ArgumentEngine::with_options(
        &[],
        providers,
        Vec::new(),
        EngineOptions {
            reducer: Reducer::Min,
        },
    );
    let inv = engine.handle(IndexMap::new(), false).unwrap();
    assert_eq!(inv.get("x_size"), Some(&int(10)));
}

#[test]
fn start_defaults_to_zero() {
    let inv = acoustic(TileSize::Extent)
        .handle(IndexMap::new(), false)
        .unwrap();
    for dim in ["t", "x", "y", "time", "x0_blk"] {
        assert_eq!(inv.get(&format!("{dim}_s")), Some(&int(0)), "{dim}_s");
    }
}

#[test]
fn explicit_start_is_kept() {
    let inv = acoustic(TileSize::Extent)
        .handle(input(&[("x_s", int(4))]), false)
        .unwrap();
    assert_eq!(inv.get("x_s"), Some(&int(4)));
}

#[test]
fn supplied_array_resizes_dimensions() {
    let inv = acoustic(TileSize::Extent)
        .handle(input(&[("m", array(&[80, 60]))]), false)
        .unwrap();
    assert_eq!(inv.get("x_size"), Some(&int(80)));
    assert_eq!(inv.get("y_size"), Some(&int(60)));
}

#[test]
fn stepping_dimension_sizes_its_parent() {
    let inv = acoustic(TileSize::Extent)
        .handle(IndexMap::new(), false)
        .unwrap();
    assert_eq!(inv.get("t_size"), Some(&int(3)));
    assert_eq!(inv.get("time_size"), Some(&int(3)));
    assert_eq!(inv.get("time_e"), Some(&int(3)));
}

#[test]
fn time_end_is_taken_from_input() {
    let inv = acoustic(TileSize::Extent)
        .handle(input(&[("time_e", int(500))]), false)
        .unwrap();
    assert_eq!(inv.get("time_e"), Some(&int(500)));
    assert_eq!(inv.get("time_size"), Some(&int(3)));
}

#[test]
fn temporary_array_gets_its_declared_shape() {
    let engine = ArgumentEngine::new(
        &[],
        vec![TempArray {
            name: "r0".into(),
            dtype: DType::Float64,
            shape: vec![8, 8],
        }
        .into()],
        Vec::new(),
    );
    let inv = engine.handle(IndexMap::new(), false).unwrap();
    assert_eq!(
        inv.get("r0"),
        Some(&Value::Array(ArrayValue::new(DType::Float64, vec![8, 8])))
    );
}

// ── Tiling and autotune ─────────────────────────────────────────────────────

#[test]
fn fixed_tile_size_disables_autotune() {
    let engine = acoustic(TileSize::Fixed { size: 8 });
    let inv = engine.handle(IndexMap::new(), true).unwrap();
    assert!(!inv.autotune);
    assert_eq!(inv.tile_sizes.get("x0_blk"), Some(&8));
    assert_eq!(inv.get("x0_blk_size"), Some(&int(8)));
}

#[test]
fn sizing_function_follows_the_request() {
    let engine = acoustic(TileSize::Function(SizingFn::new("half", |e| e / 2)));
    let inv = engine.handle(IndexMap::new(), true).unwrap();
    assert!(inv.autotune);
    assert_eq!(inv.tile_sizes.get("x0_blk"), Some(&20));
    assert_eq!(inv.get("x0_blk_size"), Some(&int(20)));

    let inv = engine.handle(IndexMap::new(), false).unwrap();
    assert!(!inv.autotune);
}

#[test]
fn tile_size_tracks_the_blocked_extent() {
    let engine = acoustic(TileSize::Fraction { divisor: 4 });
    let inv = engine
        .handle(input(&[("x_s", int(2)), ("x_e", int(30))]), true)
        .unwrap();
    // x_e carries a halo of 2: extent = 32 - 2.
    assert_eq!(inv.tile_sizes.get("x0_blk"), Some(&7));
    assert!(inv.autotune);
}

#[test]
fn no_tiling_means_autotune_follows_request() {
    let engine = ArgumentEngine::new(
        &[],
        vec![Function::new("u", DType::Float32, &["x"]).with_shape(&[4]).into()],
        Vec::new(),
    );
    assert!(engine.handle(IndexMap::new(), true).unwrap().autotune);
    assert!(!engine.handle(IndexMap::new(), false).unwrap().autotune);
}

#[test]
fn unresolvable_extent_is_reported() {
    let engine = ArgumentEngine::new(
        &[],
        vec![Dimension::new("z").into()],
        vec![TilingArgument::new("z0_blk", "z", TileSize::Extent)],
    );
    let err = engine.handle(IndexMap::new(), true).unwrap_err();
    assert_eq!(err, ArgError::UnresolvableDimension { dim: "z".into() });
    assert_eq!(err.code().0, "E0201");

    let inv = engine.handle(input(&[("z", int(64))]), true).unwrap();
    assert_eq!(inv.tile_sizes.get("z0_blk"), Some(&64));
}

// ── Composites ──────────────────────────────────────────────────────────────

#[test]
fn composite_value_binds_children() {
    let engine = ArgumentEngine::new(
        &[],
        vec![
            Function::new("src", DType::Float32, &["time", "p_src"])
                .with_shape(&[10, 1])
                .with_children(&["src_coords"])
                .into(),
            Function::new("src_coords", DType::Float32, &["p_src", "d"])
                .with_shape(&[1, 2])
                .into(),
        ],
        Vec::new(),
    );
    let composite = Value::Composite(CompositeValue {
        array: ArrayValue::new(DType::Float32, vec![10, 5]),
        children: vec![array(&[5, 2])],
    });
    let inv = engine.handle(input(&[("src", composite)]), false).unwrap();
    assert_eq!(inv.get("src"), Some(&array(&[10, 5])));
    assert_eq!(inv.get("src_coords"), Some(&array(&[5, 2])));
    assert_eq!(inv.get("p_src_size"), Some(&int(5)));
}

#[test]
fn composite_for_undeclared_name_is_rejected() {
    let composite = Value::Composite(CompositeValue {
        array: ArrayValue::new(DType::Float32, vec![1]),
        children: Vec::new(),
    });
    let err = acoustic(TileSize::Extent)
        .handle(input(&[("rec", composite)]), false)
        .unwrap_err();
    assert_eq!(err, ArgError::UnknownParameter { name: "rec".into() });
}

// ── Rejection ───────────────────────────────────────────────────────────────

#[test]
fn unknown_argument_is_rejected() {
    let err = acoustic(TileSize::Extent)
        .handle(input(&[("x_e", int(10)), ("bogus", int(1))]), false)
        .unwrap_err();
    assert_eq!(
        err,
        ArgError::UnknownArguments {
            names: vec!["bogus".into()]
        }
    );
    assert_eq!(err.code().0, "E0101");
}

#[test]
fn failing_check_returns_no_result() {
    let engine = ArgumentEngine::new(
        &[],
        vec![Scalar::new("nthreads", DType::Int32)
            .with_default(4)
            .with_check(Check::Range {
                min: Some(1.0),
                max: None,
            })
            .into()],
        Vec::new(),
    );
    let result = engine.handle(input(&[("nthreads", int(0))]), false);
    assert!(matches!(
        result,
        Err(ArgError::VerificationFailed { ref name, .. }) if name == "nthreads"
    ));
}

#[test]
fn array_rank_check_applies_to_supplied_arrays() {
    let engine = ArgumentEngine::new(
        &[],
        vec![Function::new("u", DType::Float32, &["x"])
            .with_shape(&[4])
            .with_check(Check::Rank { rank: 1 })
            .into()],
        Vec::new(),
    );
    assert!(engine.handle(IndexMap::new(), false).is_ok());
    let err = engine
        .handle(input(&[("u", Value::Array(ArrayValue::new(DType::Float32, vec![4, 4])))]), false)
        .unwrap_err();
    assert!(matches!(err, ArgError::VerificationFailed { .. }));
}

#[test]
fn missing_data_is_reported_with_hint() {
    let engine = ArgumentEngine::new(
        &[],
        vec![Function::new("u", DType::Float32, &["x"]).into()],
        Vec::new(),
    );
    let err = engine.handle(IndexMap::new(), false).unwrap_err();
    assert_eq!(err, ArgError::MissingValue { name: "u".into() });
    assert!(err.render().contains("hint:"));

    let inv = engine.handle(input(&[("u", array(&[16]))]), false).unwrap();
    assert_eq!(inv.get("x_size"), Some(&int(16)));
}
