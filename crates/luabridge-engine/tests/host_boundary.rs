//! Host function, value projection and instance registry tests
//!
//! # Running Tests
//! ```bash
//! cargo test --test host_boundary
//! ```

use std::collections::BTreeMap;

use luabridge_engine::{
    BridgeConfig, BridgeError, Bridge, CallableId, CallableKind, HostFrame, HostFunctionRegistry,
    HostKey, HostValue, SharedMap, StateOptions, VmError,
};

fn add(frame: &mut dyn HostFrame) -> Result<usize, BridgeError> {
    frame.expect_args(2)?;
    let a = frame.int_arg(0)?;
    let b = frame.int_arg(1)?;
    frame.push(HostValue::Int(a + b));
    Ok(1)
}

// ===== Function trampoline =====

#[test]
fn test_set_func_and_call() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();

    let id = state.set_func("add", add).unwrap();
    assert_eq!(id, CallableId(1));

    assert_eq!(state.eval("return add(2, 3)").unwrap(), HostValue::Int(5));
    assert_eq!(
        state.callables(),
        vec![(CallableId(1), CallableKind::Global("add".into()))]
    );
}

#[test]
fn test_host_error_surfaces_typed() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();
    state
        .set_func("fail", |_frame: &mut dyn HostFrame| {
            Err(BridgeError::Message("nope".into()))
        })
        .unwrap();

    let err = state.exec("fail()").unwrap_err();
    assert!(matches!(err, VmError::Host(BridgeError::Message(ref m)) if m == "nope"));

    // Host errors are catchable from scripts and do not poison the instance
    let caught = state.eval("return pcall(fail)").unwrap();
    assert_eq!(caught, HostValue::Bool(false));
    assert_eq!(state.eval("return 1").unwrap(), HostValue::Int(1));
}

#[test]
fn test_argument_errors_from_helpers() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();
    state.set_func("add", add).unwrap();

    assert!(matches!(
        state.exec("add(1)"),
        Err(VmError::Host(BridgeError::ArgumentError(_)))
    ));
    assert!(matches!(
        state.exec("add(1, 'x')"),
        Err(VmError::Host(BridgeError::TypeMismatch { .. }))
    ));
}

#[test]
fn test_frame_knows_instance_and_callable() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();
    state
        .set_func("whoami", |frame: &mut dyn HostFrame| {
            frame.push(HostValue::Int(frame.instance().as_u64() as i64));
            frame.push(HostValue::Int(frame.callable().as_u32() as i64));
            Ok(2)
        })
        .unwrap();

    let pair = state.eval("return {whoami()}").unwrap();
    assert_eq!(
        pair,
        HostValue::Array(vec![
            HostValue::Int(state.id().as_u64() as i64),
            HostValue::Int(1)
        ])
    );
}

#[test]
fn test_push_func_crosses_as_callable() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();

    let id = state
        .push_func(|frame: &mut dyn HostFrame| {
            frame.push(HostValue::Int(42));
            Ok(1)
        })
        .unwrap();

    state.set_global("cb", &HostValue::Callable(id)).unwrap();
    assert_eq!(state.eval("return cb()").unwrap(), HostValue::Int(42));
    assert_eq!(state.eval("return cb").unwrap(), HostValue::Callable(id));
    assert_eq!(state.callables(), vec![(id, CallableKind::Anonymous)]);
}

#[test]
fn test_bridge_functions_installed_in_every_state() {
    let mut functions = HostFunctionRegistry::new();
    functions.register("add", add);
    let mut bridge = Bridge::with_functions(functions);
    bridge.register("twice", |frame: &mut dyn HostFrame| {
        let n = frame.int_arg(0)?;
        frame.push(HostValue::Int(n * 2));
        Ok(1)
    });

    let a = bridge.new_state(&StateOptions::default()).unwrap();
    let b = bridge.new_state(&StateOptions::default()).unwrap();

    assert_eq!(a.eval("return twice(add(1, 2))").unwrap(), HostValue::Int(6));
    assert_eq!(b.eval("return add(10, 20)").unwrap(), HostValue::Int(30));
    // Installed in name order
    assert_eq!(
        a.callables(),
        vec![
            (CallableId(1), CallableKind::Global("add".into())),
            (CallableId(2), CallableKind::Global("twice".into())),
        ]
    );
}

// ===== Projection and tables =====

#[test]
fn test_eval_projects_tables() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();

    let value = state.eval("return {list = {1, 2}, name = 'x'}").unwrap();
    let mut expected = BTreeMap::new();
    expected.insert(
        HostKey::from("list"),
        HostValue::Array(vec![HostValue::Int(1), HostValue::Int(2)]),
    );
    expected.insert(HostKey::from("name"), HostValue::from("x"));
    assert_eq!(value, HostValue::Map(expected));
}

#[test]
fn test_globals_round_trip() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();

    state
        .set_global("cfg", &HostValue::Array(vec![HostValue::from("a"), HostValue::from("b")]))
        .unwrap();
    assert_eq!(state.eval("return #cfg").unwrap(), HostValue::Int(2));
    assert_eq!(state.classify_global("cfg").unwrap().as_tuple(), (true, 2));
    assert_eq!(state.get_global("missing").unwrap(), HostValue::Nil);

    // Holes would turn the array into a map on the way back
    let holey = HostValue::Array(vec![HostValue::Int(1), HostValue::Nil]);
    assert!(matches!(
        state.set_global("holey", &holey),
        Err(VmError::Projection(BridgeError::TableError(_)))
    ));
    assert_eq!(state.classify_global("missing").unwrap().as_tuple(), (false, 0));
}

#[test]
fn test_call_global() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();
    state.exec("function mul(a, b) return a * b end").unwrap();

    let product = state
        .call_global("mul", &[HostValue::Int(6), HostValue::Int(7)])
        .unwrap();
    assert_eq!(product, HostValue::Int(42));

    assert!(matches!(
        state.call_global("nothing", &[]),
        Err(VmError::Projection(_))
    ));
}

#[test]
fn test_table_view() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();
    state.exec("t = {1, 2, 3}; m = {a = 1}").unwrap();

    let t = state.table("t").unwrap();
    assert_eq!(t.append(&HostValue::Int(4)).unwrap(), 4);
    assert_eq!(t.get_index(4).unwrap(), HostValue::Int(4));
    assert!(t.get_index(5).is_err());
    assert_eq!(state.classify_global("t").unwrap().as_tuple(), (true, 4));

    let m = state.table("m").unwrap();
    assert!(!m.is_array());
    assert!(m.get_index(1).is_err());

    assert!(state.table("missing").is_err());

    let fresh = state.new_table().unwrap();
    assert_eq!(fresh.classification().as_tuple(), (true, 0));
}

#[test]
fn test_unprojectable_result() {
    let bridge = Bridge::new();
    let state = bridge.new_state(&StateOptions::default()).unwrap();

    let err = state.eval("return {[true] = 1}").unwrap_err();
    assert!(matches!(err, VmError::Projection(BridgeError::UnsupportedKey(_))));
}

// ===== Map builtins =====

#[test]
fn test_map_builtins_share_state() {
    let bridge = Bridge::new();
    let map = SharedMap::new(16);
    let writer = bridge
        .new_state(&StateOptions::default().with_shared_map(map.clone()))
        .unwrap();
    let reader = bridge
        .new_state(&StateOptions::default().with_shared_map(map.clone()))
        .unwrap();

    writer
        .exec("map_set('k1', 1); map_set('k2', true); map_set('k3', 'kstring'); map_set('k4', 1.55)")
        .unwrap();

    assert_eq!(reader.eval("return map_get('k3')").unwrap(), HostValue::from("kstring"));
    assert_eq!(reader.eval("return map_has('k2')").unwrap(), HostValue::Bool(true));
    assert_eq!(map.len(), 4);
}

#[test]
fn test_map_limit() {
    let bridge = Bridge::new();
    let state = bridge
        .new_state(&StateOptions::default().with_shared_map(SharedMap::new(2)))
        .unwrap();

    state.exec("map_set('a', 1); map_set('b', 2)").unwrap();
    let err = state.exec("map_set('c', 3)").unwrap_err();
    assert!(matches!(err, VmError::Host(BridgeError::MapLimit(2))));
    assert_eq!(state.shared_map().len(), 2);
}

#[test]
fn test_map_refuses_callables() {
    let bridge = Bridge::new();
    let map = SharedMap::new(16);
    let a = bridge
        .new_state(&StateOptions::default().with_shared_map(map.clone()))
        .unwrap();
    let b = bridge
        .new_state(&StateOptions::default().with_shared_map(map.clone()))
        .unwrap();

    a.set_func("secret", |frame: &mut dyn HostFrame| {
        frame.push(HostValue::from("A-secret"));
        Ok(1)
    })
    .unwrap();
    b.set_func("other", |frame: &mut dyn HostFrame| {
        frame.push(HostValue::from("B-other"));
        Ok(1)
    })
    .unwrap();

    // Callable ids mean nothing outside the VM that issued them
    assert!(matches!(
        a.exec("map_set('f', secret)"),
        Err(VmError::Host(BridgeError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        a.exec("map_set('t', {n = 1, f = secret})"),
        Err(VmError::Host(BridgeError::TypeMismatch { .. }))
    ));

    assert!(map.is_empty());
    assert_eq!(b.eval("return map_get('f')").unwrap(), HostValue::Nil);
}

#[test]
fn test_state_from_config() {
    let config = BridgeConfig::from_toml_str(
        r#"
        [limits]
        steps = 50

        [libs]
        open = false

        [builtins]
        map_set = true
        map_size_limit = 3
    "#,
    )
    .unwrap();

    let bridge = Bridge::new();
    let state = bridge.state_from_config(&config).unwrap();

    assert_eq!(state.limit(), 50);
    assert_eq!(state.shared_map().limit(), 3);
    assert_eq!(state.eval("return string == nil").unwrap(), HostValue::Bool(true));
    assert_eq!(state.eval("return map_get == nil").unwrap(), HostValue::Bool(true));

    state.open_libs().unwrap();
    assert_eq!(state.eval("return string ~= nil").unwrap(), HostValue::Bool(true));
}

// ===== Instance registry =====

#[test]
fn test_registry_tracks_state_lifetime() {
    let bridge = Bridge::new();
    assert!(bridge.registry().is_empty());

    let a = bridge.new_state(&StateOptions::default()).unwrap();
    let b = bridge.new_state(&StateOptions::default()).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(bridge.registry().len(), 2);

    let id = a.id();
    drop(a);
    assert!(!bridge.registry().contains(id));
    assert!(bridge.registry().contains(b.id()));
}

#[test]
fn test_instances_are_isolated() {
    let bridge = Bridge::new();
    let a = bridge.new_state(&StateOptions::default()).unwrap();
    let b = bridge
        .new_state(&StateOptions::default().with_step_limit(5))
        .unwrap();

    a.exec("x = 1").unwrap();
    assert_eq!(b.get_global("x").unwrap(), HostValue::Nil);

    assert!(b.exec("while true do end").is_err());
    // Aborting one instance leaves the other runnable
    assert_eq!(a.eval("return x").unwrap(), HostValue::Int(1));
}
