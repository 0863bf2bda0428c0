use std::path::Path;
use std::sync::Arc;

use chariot_core::{ChariotError, Result, TreeNode, TreeRef, Value};

use super::{arg, str_arg};
use crate::persist;
use crate::registry::{FunctionRegistry, FunctionSpec};

fn tree_arg(function: &str, args: &[Value], i: usize) -> Result<TreeRef> {
    match arg(function, args, i)? {
        Value::Tree(t) => Ok(Arc::clone(t)),
        other => Err(ChariotError::type_mismatch(
            function,
            format!("expected tree node, got {}", other.type_tag().name()),
        )),
    }
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(FunctionSpec::new("create", 1, Some(1), "create(name)", |_, args| {
        let name = str_arg("create", &args, 0)?;
        Ok(Value::Tree(TreeNode::new(name).into_ref()))
    }));

    registry.register(FunctionSpec::new(
        "setAttribute",
        3,
        Some(3),
        "setAttribute(node, key, value)",
        |_, args| {
            let node = tree_arg("setAttribute", &args, 0)?;
            let key = str_arg("setAttribute", &args, 1)?;
            args[0].ensure_acyclic("setAttribute", &args[2])?;
            node.write().set_property(key, args[2].clone());
            Ok(args[2].clone())
        },
    ));

    registry.register(FunctionSpec::new(
        "getAttribute",
        2,
        Some(2),
        "getAttribute(node, key)",
        |_, args| {
            let node = tree_arg("getAttribute", &args, 0)?;
            let key = str_arg("getAttribute", &args, 1)?;
            let value = node.read().attributes.get(key).cloned();
            Ok(value.unwrap_or_default())
        },
    ));

    registry.register(FunctionSpec::new(
        "addChild",
        2,
        Some(2),
        "addChild(parent, child)",
        |_, args| {
            let parent = tree_arg("addChild", &args, 0)?;
            let child = tree_arg("addChild", &args, 1)?;
            if args[1].reaches(&args[0]) {
                return Err(ChariotError::InvalidArgument(
                    "addChild: a node cannot be its own descendant".into(),
                ));
            }
            parent.write().add_child(child);
            Ok(args[0].clone())
        },
    ));

    // ── Persistence ──
    registry.register(FunctionSpec::new(
        "treeSave",
        2,
        Some(2),
        "treeSave(node, path)",
        |_, args| {
            let node = tree_arg("treeSave", &args, 0)?;
            persist::save_tree(Path::new(str_arg("treeSave", &args, 1)?), &node)?;
            Ok(Value::Bool(true))
        },
    ));

    registry.register(FunctionSpec::new("treeLoad", 1, Some(1), "treeLoad(path)", |ev, args| {
        let path = str_arg("treeLoad", &args, 0)?;
        let tree = persist::load_tree(Path::new(path), ev.runtime().globals())?;
        Ok(Value::Tree(tree))
    }));

    registry.register(FunctionSpec::new(
        "treeToJSON",
        1,
        Some(1),
        "treeToJSON(node)",
        |_, args| {
            let node = tree_arg("treeToJSON", &args, 0)?;
            Ok(Value::String(persist::tree_to_json(&node)?))
        },
    ));

    registry.register(FunctionSpec::new(
        "treeFromJSON",
        1,
        Some(1),
        "treeFromJSON(json)",
        |ev, args| {
            let raw = str_arg("treeFromJSON", &args, 0)?;
            let tree = persist::tree_from_json(raw, ev.runtime().globals())?;
            Ok(Value::Tree(tree))
        },
    ));
}
