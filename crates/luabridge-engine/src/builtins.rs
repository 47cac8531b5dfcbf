//! Map builtins: `map_set(key, value)`, `map_get(key)` and `map_has(key)`
//! over a [`SharedMap`] the host can read after (or between) runs.

use luabridge_sdk::{host_fn, CallableKind, HostFn, HostFrame, HostValue, SharedMap};
use mlua::Lua;

use crate::config::BuiltinsConfig;
use crate::trampoline;

fn map_set(map: SharedMap) -> HostFn {
    host_fn(move |frame: &mut dyn HostFrame| {
        frame.expect_args(2)?;
        let key = frame.str_arg(0)?;
        let value = frame.arg(1)?;
        map.set(key, value)?;
        Ok(0)
    })
}

fn map_get(map: SharedMap) -> HostFn {
    host_fn(move |frame: &mut dyn HostFrame| {
        frame.expect_args(1)?;
        let key = frame.str_arg(0)?;
        frame.push(map.get(&key).unwrap_or_default());
        Ok(1)
    })
}

fn map_has(map: SharedMap) -> HostFn {
    host_fn(move |frame: &mut dyn HostFrame| {
        frame.expect_args(1)?;
        let key = frame.str_arg(0)?;
        frame.push(HostValue::Bool(map.contains(&key)));
        Ok(1)
    })
}

/// Register the builtins enabled in `config` as globals of `lua`
pub fn install(lua: &Lua, config: &BuiltinsConfig, map: &SharedMap) -> mlua::Result<()> {
    if config.map_set {
        trampoline::register(lua, CallableKind::Global("map_set".into()), map_set(map.clone()))?;
    }
    if config.map_get {
        trampoline::register(lua, CallableKind::Global("map_get".into()), map_get(map.clone()))?;
        trampoline::register(lua, CallableKind::Global("map_has".into()), map_has(map.clone()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all() -> BuiltinsConfig {
        BuiltinsConfig {
            map_set: true,
            map_get: true,
            map_size_limit: 4,
        }
    }

    #[test]
    fn test_set_get_has() {
        let lua = Lua::new();
        let map = SharedMap::new(4);
        install(&lua, &all(), &map).unwrap();

        lua.load("map_set('k1', 1); map_set('k2', true); map_set('k3', 'kstring'); map_set('k4', 1.55)")
            .exec()
            .unwrap();

        assert_eq!(map.get("k1"), Some(HostValue::Int(1)));
        assert_eq!(map.get("k4"), Some(HostValue::Float(1.55)));

        let (v, has, missing): (String, bool, bool) = lua
            .load("return map_get('k3'), map_has('k2'), map_has('zz')")
            .eval()
            .unwrap();
        assert_eq!(v, "kstring");
        assert!(has);
        assert!(!missing);

        let absent: mlua::Value = lua.load("return map_get('zz')").eval().unwrap();
        assert!(absent.is_nil());
    }

    #[test]
    fn test_limit_and_overwrite() {
        let lua = Lua::new();
        let map = SharedMap::new(2);
        install(&lua, &all(), &map).unwrap();

        lua.load("map_set('a', 1); map_set('b', 2); map_set('a', 3)").exec().unwrap();
        assert_eq!(map.get("a"), Some(HostValue::Int(3)));
        assert!(lua.load("map_set('c', 1)").exec().is_err());
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_argument_checks() {
        let lua = Lua::new();
        let map = SharedMap::new(4);
        install(&lua, &all(), &map).unwrap();

        assert!(lua.load("map_set('only-key')").exec().is_err());
        assert!(lua.load("map_set(1, 2)").exec().is_err());
        assert!(lua.load("map_get()").exec().is_err());
    }

    #[test]
    fn test_only_enabled_builtins_installed() {
        let lua = Lua::new();
        let config = BuiltinsConfig {
            map_set: true,
            ..BuiltinsConfig::default()
        };
        install(&lua, &config, &SharedMap::default()).unwrap();

        let installed: (bool, bool, bool) = lua
            .load("return map_set ~= nil, map_get ~= nil, map_has ~= nil")
            .eval()
            .unwrap();
        assert_eq!(installed, (true, false, false));
    }
}
