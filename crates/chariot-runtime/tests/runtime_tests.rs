#[cfg(test)]
mod tests {
    use chariot_core::ast::*;
    use chariot_core::{ErrorKind, HostObject, Node, Program, Result, TreeNode, Value};
    use chariot_runtime::persist;
    use chariot_runtime::*;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::time::Duration;

    fn exec(rt: &Runtime, statements: Vec<Node>) -> Result<Value> {
        rt.exec_program(&Program::new(statements))
    }

    fn declare(name: &str, tag: &str, value: Node) -> Node {
        call("declare", vec![var(name), text(tag), value])
    }

    fn declare_global(name: &str, tag: &str, value: Node) -> Node {
        call("declareGlobal", vec![var(name), text(tag), value])
    }

    fn setq(name: &str, value: Node) -> Node {
        call("setq", vec![var(name), value])
    }

    fn plan_node(
        name: &str,
        params: &[&str],
        trigger: Node,
        guard: Node,
        steps: Vec<Vec<Node>>,
        drop: Node,
    ) -> Node {
        call(
            "plan",
            vec![
                text(name),
                call("array", params.iter().map(|p| text(*p)).collect()),
                func(&[], vec![trigger]),
                func(&[], vec![guard]),
                call("array", steps.into_iter().map(|s| func(&[], s)).collect()),
                func(&[], vec![drop]),
            ],
        )
    }

    fn with_sink() -> (Arc<Runtime>, Arc<MemoryLogSink>) {
        let sink = Arc::new(MemoryLogSink::new(100));
        let rt = Runtime::builder().sink(sink.clone()).build();
        (rt, sink)
    }

    fn messages(sink: &MemoryLogSink) -> Vec<String> {
        sink.entries().into_iter().map(|e| e.message).collect()
    }

    #[derive(Debug)]
    struct Thermometer;

    impl HostObject for Thermometer {
        fn type_name(&self) -> &str {
            "thermometer"
        }

        fn property(&self, name: &str) -> Option<Value> {
            (name == "celsius").then(|| Value::from(21.5))
        }
    }

    // ── Scoping tests ──────────────────────────────────────────

    #[test]
    fn test_block_declaration_shadows_outer() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare("x", "N", num(5.0)),
                declare("inner", "N", num(0.0)),
                block(vec![declare("x", "N", num(10.0)), setq("inner", var("x"))]),
                call("array", vec![var("inner"), var("x")]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::array(vec![Value::from(10.0), Value::from(5.0)]));
    }

    #[test]
    fn test_setq_on_shadowed_name_touches_innermost_only() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare_global("x", "N", num(5.0)),
                block(vec![declare("x", "N", num(10.0)), setq("x", num(11.0))]),
                var("x"),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::from(5.0));
        assert_eq!(rt.global("x"), Some(Value::from(5.0)));
    }

    #[test]
    fn test_setq_type_mismatch() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![declare("n", "N", num(1.0)), setq("n", text("one"))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("cannot assign to n"));
    }

    #[test]
    fn test_untyped_declaration_accepts_any_value() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![declare("v", "V", num(1.0)), setq("v", text("text")), var("v")],
        )
        .unwrap();
        assert_eq!(result, Value::from("text"));
    }

    #[test]
    fn test_setq_creates_missing_name_in_current_scope() {
        let rt = Runtime::new();
        let result = exec(&rt, vec![setq("fresh", num(3.0)), var("fresh")]).unwrap();
        assert_eq!(result, Value::from(3.0));
        assert!(rt.global("fresh").is_none());
    }

    #[test]
    fn test_unknown_type_code_rejected() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![declare("x", "Q", num(1.0))]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    // ── Resolution tests ───────────────────────────────────────

    #[test]
    fn test_undefined_variable_and_function_are_distinct() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![var("nope")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
        assert_eq!(err.to_string(), "variable 'nope' not defined");

        let err = exec(&rt, vec![call("nope", vec![])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedFunction);
        assert_eq!(err.to_string(), "undefined function 'nope'");
    }

    #[test]
    fn test_arity_checked_before_call() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![call("setq", vec![var("x")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Arity);
        assert!(err.to_string().contains("setq(name, value)"));
        assert!(err.to_string().contains("got 1"));
    }

    #[test]
    fn test_host_registries_follow_scope_chain() {
        let rt = Runtime::new();
        rt.register_object("thermo", Arc::new(Thermometer));
        rt.register_collection("readings", Value::array(vec![Value::from(1.0)]));
        rt.register_node("doc", TreeNode::new("doc").into_ref());

        let temp = exec(&rt, vec![call("getProp", vec![var("thermo"), text("celsius")])]).unwrap();
        assert_eq!(temp, Value::from(21.5));
        let len = exec(&rt, vec![call("length", vec![var("readings")])]).unwrap();
        assert_eq!(len, Value::from(1.0));
        let kind = exec(&rt, vec![call("typeOf", vec![var("doc")])]).unwrap();
        assert_eq!(kind, Value::from("T"));

        // A scope binding wins over the collection of the same name.
        let shadowed = exec(&rt, vec![declare("readings", "S", text("mine")), var("readings")]).unwrap();
        assert_eq!(shadowed, Value::from("mine"));
    }

    #[test]
    fn test_builtin_name_resolves_to_callable_value() {
        let rt = Runtime::new();
        let result = exec(&rt, vec![call_value(var("add"), vec![num(1.0), num(2.0)])]).unwrap();
        assert_eq!(result, Value::from(3.0));
        let code = exec(&rt, vec![call("typeOf", vec![var("add")])]).unwrap();
        assert_eq!(code, Value::from("F"));
    }

    #[test]
    fn test_getprop_on_scalar_is_type_error() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![call("getProp", vec![num(1.0), text("x")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        let missing = exec(&rt, vec![call("getProp", vec![call("map", vec![]), text("x")])]).unwrap();
        assert!(missing.is_null());
    }

    // ── Closure tests ──────────────────────────────────────────

    #[test]
    fn test_closure_call_binds_params() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare("twice", "F", func(&["n"], vec![call("mul", vec![var("n"), num(2.0)])])),
                call("twice", vec![num(21.0)]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::from(42.0));
    }

    #[test]
    fn test_missing_params_are_null() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare("f", "F", func(&["a", "b"], vec![call("isNull", vec![var("b")])])),
                call("f", vec![num(1.0)]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn test_closure_captures_defining_scope() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare("base", "N", num(10.0)),
                declare("addBase", "F", func(&["n"], vec![call("add", vec![var("n"), var("base")])])),
                block(vec![declare("base", "N", num(1000.0)), call("addBase", vec![num(1.0)])]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::from(11.0));
    }

    #[test]
    fn test_return_and_while_loop() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare(
                    "firstOver",
                    "F",
                    func(
                        &["limit"],
                        vec![
                            declare("i", "N", num(0.0)),
                            while_loop(
                                boolean(true),
                                vec![
                                    setq("i", call("add", vec![var("i"), num(1.0)])),
                                    if_else(
                                        call("bigger", vec![var("i"), var("limit")]),
                                        vec![ret(Some(var("i")))],
                                        vec![],
                                    ),
                                ],
                            ),
                        ],
                    ),
                ),
                call("firstOver", vec![num(4.0)]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::from(5.0));
    }

    #[test]
    fn test_break_leaves_loop() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare("i", "N", num(0.0)),
                while_loop(
                    boolean(true),
                    vec![
                        setq("i", call("add", vec![var("i"), num(1.0)])),
                        if_else(call("equal", vec![var("i"), num(3.0)]), vec![Node::Break], vec![]),
                    ],
                ),
                var("i"),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::from(3.0));
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        // Deep evaluation needs more stack than the default test thread.
        let worker = std::thread::Builder::new()
            .stack_size(64 << 20)
            .spawn(|| {
                let rt = Runtime::new();
                exec(
                    &rt,
                    vec![
                        declare_global("spin", "F", func(&[], vec![call("spin", vec![])])),
                        call("spin", vec![]),
                    ],
                )
            })
            .unwrap();
        let err = worker.join().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Eval);
        assert!(err.to_string().contains("maximum call depth"));
    }

    #[test]
    fn test_host_can_call_closure_values() {
        let rt = Runtime::new();
        exec(&rt, vec![declare_global("inc", "F", func(&["n"], vec![call("add", vec![var("n"), num(1.0)])]))])
            .unwrap();
        let inc = rt.global("inc").unwrap();
        assert_eq!(rt.call(&inc, vec![Value::from(1.0)]).unwrap(), Value::from(2.0));
    }

    // ── Global visibility tests ────────────────────────────────

    #[test]
    fn test_declare_global_visible_in_later_programs() {
        let rt = Runtime::new();
        exec(&rt, vec![declare_global("g", "N", num(42.0)), declare("local", "N", num(1.0))]).unwrap();

        assert_eq!(exec(&rt, vec![var("g")]).unwrap(), Value::from(42.0));
        let err = exec(&rt, vec![var("local")]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
        assert_eq!(rt.list_global_variables(), vec!["g".to_string()]);
    }

    #[test]
    fn test_session_clone_sees_globals_but_does_not_leak_back() {
        let rt = Runtime::new();
        exec(&rt, vec![declare_global("g", "N", num(42.0))]).unwrap();

        let session = rt.clone_for_session();
        assert_eq!(exec(&session, vec![var("g")]).unwrap(), Value::from(42.0));

        exec(
            &session,
            vec![declare_global("g", "N", num(7.0)), declare_global("mine", "S", text("s"))],
        )
        .unwrap();
        assert_eq!(rt.global("g"), Some(Value::from(42.0)));
        assert!(rt.global("mine").is_none());
    }

    #[test]
    fn test_session_snapshot_is_not_live() {
        let rt = Runtime::new();
        let early = rt.clone_for_session();
        exec(&rt, vec![declare_global("late", "N", num(1.0))]).unwrap();

        assert!(exec(&early, vec![var("late")]).is_err());
        let later = rt.clone_for_session();
        assert_eq!(exec(&later, vec![var("late")]).unwrap(), Value::from(1.0));
    }

    #[test]
    fn test_session_clone_imports_host_registries() {
        let rt = Runtime::new();
        rt.register_collection("readings", Value::array(vec![]));
        let session = rt.clone_for_session();
        assert!(session.collection("readings").is_some());
        assert!(Arc::ptr_eq(session.registry(), rt.registry()));
    }

    #[test]
    fn test_constants_hidden_from_global_listing() {
        let rt = Runtime::new();
        assert_eq!(exec(&rt, vec![var("true")]).unwrap(), Value::Bool(true));
        assert!(rt.list_global_variables().is_empty());
    }

    // ── Plan value tests ───────────────────────────────────────

    #[test]
    fn test_plan_field_roundtrip_through_builtins() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare(
                    "p",
                    "P",
                    plan_node(
                        "cool",
                        &["room"],
                        boolean(true),
                        boolean(true),
                        vec![vec![num(1.0)], vec![num(2.0)], vec![num(3.0)]],
                        boolean(false),
                    ),
                ),
                declare("before", "S", call("getProp", vec![var("p"), text("name")])),
                declare("count", "N", call("length", vec![call("getProp", vec![var("p"), text("steps")])])),
                call("setProp", vec![var("p"), text("name"), text("heat")]),
                call(
                    "array",
                    vec![var("before"), var("count"), call("getProp", vec![var("p"), text("name")])],
                ),
            ],
        )
        .unwrap();
        assert_eq!(
            result,
            Value::array(vec![Value::from("cool"), Value::from(3.0), Value::from("heat")])
        );
    }

    #[test]
    fn test_plan_constructor_validates_closures() {
        let rt = Runtime::new();
        let err = exec(
            &rt,
            vec![call(
                "plan",
                vec![
                    text("bad"),
                    call("array", vec![]),
                    num(1.0),
                    func(&[], vec![boolean(true)]),
                    call("array", vec![]),
                    func(&[], vec![boolean(false)]),
                ],
            )],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_plan_unknown_property() {
        let rt = Runtime::new();
        let err = exec(
            &rt,
            vec![call(
                "getProp",
                vec![
                    plan_node("p", &[], boolean(true), boolean(true), vec![], boolean(false)),
                    text("priority"),
                ],
            )],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PropertyNotFound);
        assert!(err.to_string().contains("not found in Plan"));
    }

    // ── One-shot execution tests ───────────────────────────────

    #[test]
    fn test_drop_after_first_step_returns_true_and_skips_rest() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![
                declare_global("flag", "L", boolean(false)),
                declare_global("counter", "N", num(0.0)),
                declare(
                    "p",
                    "P",
                    plan_node(
                        "twoStep",
                        &[],
                        boolean(true),
                        boolean(true),
                        vec![
                            vec![setq("flag", boolean(true))],
                            vec![setq("counter", num(99.0))],
                        ],
                        var("flag"),
                    ),
                ),
                call("runPlanOnce", vec![var("p")]),
            ],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(rt.global("flag"), Some(Value::Bool(true)));
        assert_eq!(rt.global("counter"), Some(Value::from(0.0)));
    }

    #[test]
    fn test_drop_before_first_step_returns_false() {
        let (rt, sink) = with_sink();
        let result = exec(
            &rt,
            vec![call(
                "runPlanOnce",
                vec![plan_node(
                    "never",
                    &[],
                    boolean(true),
                    boolean(true),
                    vec![vec![call("logPrint", vec![text("ran")])]],
                    boolean(true),
                )],
            )],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(false));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_false_trigger_or_guard_returns_false() {
        let rt = Runtime::new();
        for (trigger, guard) in [(false, true), (true, false)] {
            let result = exec(
                &rt,
                vec![call(
                    "runPlanOnce",
                    vec![plan_node(
                        "gated",
                        &[],
                        boolean(trigger),
                        boolean(guard),
                        vec![vec![num(1.0)]],
                        boolean(false),
                    )],
                )],
            )
            .unwrap();
            assert_eq!(result, Value::Bool(false));
        }
    }

    #[test]
    fn test_steps_run_in_order_and_share_instance_scope() {
        let (rt, sink) = with_sink();
        let result = exec(
            &rt,
            vec![call(
                "runPlanOnce",
                vec![plan_node(
                    "ordered",
                    &[],
                    boolean(true),
                    boolean(true),
                    vec![
                        vec![setq("note", text("first")), call("logPrint", vec![var("note")])],
                        vec![call("logPrint", vec![call("concat", vec![var("note"), text(" then second")])])],
                    ],
                    boolean(false),
                )],
            )],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(true));
        assert_eq!(messages(&sink), vec!["first", "first then second"]);
        assert!(rt.global("note").is_none());
    }

    #[test]
    fn test_step_error_propagates_to_caller() {
        let rt = Runtime::new();
        let err = exec(
            &rt,
            vec![call(
                "runPlanOnce",
                vec![plan_node(
                    "broken",
                    &[],
                    boolean(true),
                    boolean(true),
                    vec![vec![var("missing")]],
                    boolean(false),
                )],
            )],
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UndefinedVariable);
    }

    fn thermostat() -> Node {
        let temp = || call("belief", vec![text("thermo"), text("currentTemp")]);
        plan_node(
            "thermostat",
            &[],
            call(
                "or",
                vec![
                    call("smaller", vec![temp(), call("belief", vec![text("thermo"), text("lower")])]),
                    call("bigger", vec![temp(), call("belief", vec![text("thermo"), text("upper")])]),
                ],
            ),
            boolean(true),
            vec![vec![call("logPrint", vec![text("adjusting")])]],
            boolean(false),
        )
    }

    fn readings(temp: f64) -> Node {
        call(
            "map",
            vec![
                text("currentTemp"),
                num(temp),
                text("lower"),
                num(18.0),
                text("upper"),
                num(24.0),
            ],
        )
    }

    #[test]
    fn test_trigger_gating_with_transient_beliefs() {
        let (rt, sink) = with_sink();
        exec(&rt, vec![declare_global("p", "P", thermostat())]).unwrap();

        let idle = exec(&rt, vec![call("runPlanOnceEx", vec![var("p")])]).unwrap();
        assert_eq!(idle, Value::Bool(false));

        let in_band = exec(&rt, vec![call("runPlanOnceEx", vec![var("p"), text("bdi"), readings(20.0)])]).unwrap();
        assert_eq!(in_band, Value::Bool(false));

        let too_hot = exec(&rt, vec![call("runPlanOnceEx", vec![var("p"), text("bdi"), readings(30.0)])]).unwrap();
        assert_eq!(too_hot, Value::Bool(true));
        assert_eq!(messages(&sink), vec!["adjusting"]);

        let bdi = exec(&rt, vec![call("runPlanOnceBDI", vec![var("p"), readings(10.0)])]).unwrap();
        assert_eq!(bdi, Value::Bool(true));
    }

    #[test]
    fn test_transient_beliefs_do_not_persist() {
        let rt = Runtime::new();
        exec(&rt, vec![declare_global("p", "P", thermostat())]).unwrap();
        exec(&rt, vec![call("runPlanOnceBDI", vec![var("p"), readings(30.0)])]).unwrap();
        let again = exec(&rt, vec![call("runPlanOnceBDI", vec![var("p")])]).unwrap();
        assert_eq!(again, Value::Bool(false));
    }

    #[test]
    fn test_nested_runs_see_outer_transient_beliefs() {
        let (rt, sink) = with_sink();
        let temp = || call("belief", vec![text("thermo"), text("currentTemp")]);
        let upper = || call("belief", vec![text("thermo"), text("upper")]);
        exec(
            &rt,
            vec![
                declare_global(
                    "cool",
                    "P",
                    plan_node(
                        "cool",
                        &[],
                        call("bigger", vec![temp(), upper()]),
                        boolean(true),
                        vec![vec![call("logPrint", vec![call("concat", vec![text("cool "), upper()])])]],
                        boolean(false),
                    ),
                ),
                declare_global(
                    "outer",
                    "P",
                    plan_node(
                        "outer",
                        &[],
                        boolean(true),
                        boolean(true),
                        vec![
                            vec![call("runPlanOnce", vec![var("cool")])],
                            vec![call(
                                "runPlanOnceEx",
                                vec![var("cool"), text("bdi"), call("map", vec![text("upper"), num(40.0)])],
                            )],
                            vec![call(
                                "runPlanOnceEx",
                                vec![var("cool"), text("bdi"), call("map", vec![text("upper"), num(25.0)])],
                            )],
                        ],
                        boolean(false),
                    ),
                ),
            ],
        )
        .unwrap();

        let ran = exec(&rt, vec![call("runPlanOnceBDI", vec![var("outer"), readings(30.0)])]).unwrap();
        assert_eq!(ran, Value::Bool(true));
        // The inner map only overrides `upper`; `currentTemp` still comes from the outer run.
        assert_eq!(messages(&sink), vec!["cool 24", "cool 25"]);
    }

    #[test]
    fn test_run_modes() {
        let (rt, sink) = with_sink();
        exec(
            &rt,
            vec![declare_global(
                "p",
                "P",
                plan_node(
                    "modes",
                    &[],
                    boolean(false),
                    boolean(false),
                    vec![vec![call("logPrint", vec![text("step")])]],
                    var("stop"),
                ),
            )],
        )
        .unwrap();
        exec(&rt, vec![declare_global("stop", "L", boolean(false))]).unwrap();

        let run = |mode: &str| {
            exec(&rt, vec![call("runPlanOnceEx", vec![var("p"), text(mode)])]).unwrap()
        };
        assert_eq!(run("bdi"), Value::Bool(false));
        assert_eq!(run("guard-only"), Value::Bool(false));
        assert_eq!(run("dry-run"), Value::Bool(false));
        assert_eq!(run("force"), Value::Bool(true));
        assert_eq!(run("no-such-mode"), Value::Bool(false));
        assert_eq!(messages(&sink), vec!["step"]);

        exec(&rt, vec![setq("stop", boolean(true))]).unwrap();
        assert_eq!(run("force"), Value::Bool(false));
        assert_eq!(run("force-all"), Value::Bool(true));
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_dry_run_reports_without_running_steps() {
        let (rt, sink) = with_sink();
        let result = exec(
            &rt,
            vec![call(
                "runPlanOnceEx",
                vec![
                    plan_node(
                        "ready",
                        &[],
                        boolean(true),
                        boolean(true),
                        vec![vec![call("logPrint", vec![text("ran")])]],
                        boolean(false),
                    ),
                    text("dry-run"),
                ],
            )],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(true));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_plan_params_bound_from_vars() {
        let (rt, sink) = with_sink();
        exec(
            &rt,
            vec![call(
                "runPlanOnceEx",
                vec![
                    plan_node(
                        "greet",
                        &["room", "unset"],
                        boolean(true),
                        boolean(true),
                        vec![vec![call(
                            "logPrint",
                            vec![call("concat", vec![var("room"), text(":"), var("unset")])],
                        )]],
                        boolean(false),
                    ),
                    text("force"),
                    call("map", vec![text("room"), text("kitchen")]),
                ],
            )],
        )
        .unwrap();
        assert_eq!(messages(&sink), vec!["kitchen:null"]);
    }

    #[test]
    fn test_engine_outcomes_directly() {
        assert!(CycleOutcome::Completed { steps: 2 }.succeeded());
        assert!(CycleOutcome::Dropped { completed_steps: 1 }.succeeded());
        assert!(!CycleOutcome::Dropped { completed_steps: 0 }.succeeded());
        assert!(!CycleOutcome::Cancelled { completed_steps: 1 }.succeeded());
        assert_eq!(RunMode::parse("FORCE_ALL"), RunMode::ForceAll);
        assert_eq!(RunMode::parse("whatever"), RunMode::Bdi);
    }

    // ── Logging tests ──────────────────────────────────────────

    #[test]
    fn test_log_print_levels() {
        let (rt, sink) = with_sink();
        exec(
            &rt,
            vec![
                call("logPrint", vec![text("hello")]),
                call("logPrint", vec![num(3.0), text("warn")]),
            ],
        )
        .unwrap();
        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].level, LogLevel::Warn);
        assert_eq!(entries[1].message, "3");
    }

    #[test]
    fn test_memory_sink_is_bounded() {
        let sink = MemoryLogSink::new(2);
        for i in 0..3 {
            sink.append(LogEntry::new(LogLevel::Info, format!("m{i}")));
        }
        assert_eq!(messages(&sink), vec!["m1", "m2"]);
        assert_eq!(sink.drain().len(), 2);
        assert!(sink.is_empty());
    }

    // ── Collection tests ───────────────────────────────────────

    #[test]
    fn test_array_index_out_of_bounds() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![call("getAt", vec![call("array", vec![num(1.0)]), num(5.0)])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OutOfBounds);
    }

    #[test]
    fn test_comparisons_on_null_are_false() {
        let rt = Runtime::new();
        let result = exec(
            &rt,
            vec![call(
                "or",
                vec![
                    call("bigger", vec![null(), num(1.0)]),
                    call("smaller", vec![null(), num(1.0)]),
                ],
            )],
        )
        .unwrap();
        assert_eq!(result, Value::Bool(false));
    }

    #[test]
    fn test_containers_cannot_hold_themselves() {
        let rt = Runtime::new();
        exec(
            &rt,
            vec![
                declare_global("a", "A", call("array", vec![num(1.0)])),
                declare_global("wrapper", "A", call("array", vec![var("a")])),
                declare_global("m", "M", call("map", vec![])),
            ],
        )
        .unwrap();

        let attempts = [
            call("append", vec![var("a"), var("a")]),
            call("append", vec![var("a"), num(2.0), var("wrapper")]),
            call("setAt", vec![var("a"), num(0.0), var("wrapper")]),
            call("setProp", vec![var("m"), text("me"), var("m")]),
            call("setProp", vec![var("m"), text("list"), call("array", vec![var("m")])]),
        ];
        for attempt in attempts {
            let err = exec(&rt, vec![attempt]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            assert!(err.to_string().contains("cannot contain itself"));
        }

        // Rejected inserts leave the containers printable and unchanged.
        let shown = exec(&rt, vec![call("concat", vec![var("wrapper"), var("m")])]).unwrap();
        assert_eq!(shown, Value::from("[[1]]{}"));

        // Sharing one container in several places is fine.
        let shared = exec(&rt, vec![call("append", vec![var("wrapper"), var("a")]), call("length", vec![var("wrapper")])]).unwrap();
        assert_eq!(shared, Value::from(2.0));
    }

    #[test]
    fn test_tree_cannot_adopt_its_ancestor() {
        let rt = Runtime::new();
        exec(
            &rt,
            vec![
                declare_global("root", "T", call("create", vec![text("root")])),
                declare_global("leaf", "T", call("create", vec![text("leaf")])),
                call("addChild", vec![var("root"), var("leaf")]),
            ],
        )
        .unwrap();

        let err = exec(&rt, vec![call("addChild", vec![var("leaf"), var("root")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let err = exec(&rt, vec![call("setAttribute", vec![var("leaf"), text("up"), call("array", vec![var("root")])])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let children = exec(&rt, vec![call("length", vec![var("leaf")])]).unwrap();
        assert_eq!(children, Value::from(0.0));
    }

    // ── Persistence tests ──────────────────────────────────────

    #[test]
    fn test_plan_survives_tree_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.json");
        let path = path.to_str().unwrap();

        let rt = Runtime::new();
        exec(
            &rt,
            vec![
                declare_global("doc", "T", call("create", vec![text("doc")])),
                call(
                    "setAttribute",
                    vec![
                        var("doc"),
                        text("plan"),
                        plan_node(
                            "stored",
                            &["a", "b"],
                            boolean(true),
                            boolean(true),
                            vec![vec![num(1.0)]],
                            boolean(false),
                        ),
                    ],
                ),
                call("treeSave", vec![var("doc"), text(path)]),
            ],
        )
        .unwrap();

        let fresh = Runtime::new();
        let result = exec(
            &fresh,
            vec![
                declare("loaded", "T", call("treeLoad", vec![text(path)])),
                declare("p", "V", call("getAttribute", vec![var("loaded"), text("plan")])),
                call(
                    "array",
                    vec![
                        call("typeOf", vec![var("p")]),
                        call("getProp", vec![var("p"), text("name")]),
                        call("length", vec![call("getProp", vec![var("p"), text("params")])]),
                        call("runPlanOnce", vec![var("p")]),
                    ],
                ),
            ],
        )
        .unwrap();
        assert_eq!(
            result,
            Value::array(vec![
                Value::from("P"),
                Value::from("stored"),
                Value::from(2.0),
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn test_tree_json_keeps_children_and_scalars() {
        let rt = Runtime::new();
        let json = exec(
            &rt,
            vec![
                declare("root", "T", call("create", vec![text("root")])),
                declare("leaf", "T", call("create", vec![text("leaf")])),
                call("setAttribute", vec![var("leaf"), text("weight"), num(2.5)]),
                call("addChild", vec![var("root"), var("leaf")]),
                call("treeToJSON", vec![var("root")]),
            ],
        )
        .unwrap();
        let back = exec(
            &rt,
            vec![
                declare("t", "T", call("treeFromJSON", vec![text(json.to_string())])),
                call("length", vec![var("t")]),
            ],
        )
        .unwrap();
        assert_eq!(back, Value::from(1.0));
    }

    #[test]
    fn test_host_reference_not_persistable() {
        let value = Value::HostRef(Arc::new(Thermometer));
        let err = persist::encode_value(&value).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    // ── Session manager tests ──────────────────────────────────

    #[tokio::test]
    async fn test_session_lifecycle() {
        let bootstrap = Runtime::new();
        exec(&bootstrap, vec![declare_global("greeting", "S", text("hi"))]).unwrap();
        let sessions = SessionManager::new(bootstrap, Duration::from_secs(60));

        let id = sessions.create(Some("ada")).await;
        assert_eq!(sessions.active_count().await, 1);
        let rt = sessions.get(id).await.unwrap();
        assert_eq!(rt.global("greeting"), Some(Value::from("hi")));
        assert_eq!(sessions.session(id).await.unwrap().user.as_deref(), Some("ada"));

        assert!(sessions.end(id).await);
        assert!(!sessions.end(id).await);
        assert!(sessions.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_from_each_other() {
        let sessions = SessionManager::new(Runtime::new(), Duration::from_secs(60));
        let a = sessions.create(None).await;
        let b = sessions.create(None).await;
        let rt_a = sessions.get(a).await.unwrap();
        let rt_b = sessions.get(b).await.unwrap();

        exec(&rt_a, vec![declare_global("only_a", "N", num(1.0))]).unwrap();
        assert!(rt_b.global("only_a").is_none());
        assert!(sessions.bootstrap().global("only_a").is_none());
    }

    #[tokio::test]
    async fn test_expired_sessions_cleaned_up() {
        let sessions = SessionManager::new(Runtime::new(), Duration::from_millis(1));
        sessions.create(None).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(sessions.cleanup_expired().await, 1);
        assert_eq!(sessions.active_count().await, 0);
    }

    // ── Registry tests ─────────────────────────────────────────

    #[test]
    fn test_registry_contains_core_library() {
        let registry = FunctionRegistry::with_builtins();
        for name in [
            "declare",
            "declareGlobal",
            "setq",
            "plan",
            "runPlanOnce",
            "runPlanOnceEx",
            "runPlanOnceBDI",
            "agentStartNamed",
            "agentStopNamed",
            "agentList",
            "agentBelief",
            "belief",
            "getProp",
            "setProp",
            "logPrint",
        ] {
            assert!(registry.contains(name), "missing builtin {name}");
        }
    }

    #[test]
    fn test_custom_registry_function() {
        let mut registry = FunctionRegistry::with_builtins();
        registry.register(FunctionSpec::new("answer", 0, Some(0), "answer()", |_, _| {
            Ok(Value::from(42.0))
        }));
        let rt = Runtime::builder().registry(Arc::new(registry)).build();
        assert_eq!(exec(&rt, vec![call("answer", vec![])]).unwrap(), Value::from(42.0));
        let err = exec(&rt, vec![call("answer", vec![num(1.0)])]).unwrap_err();
        assert!(err.to_string().contains("answer: expected 0 argument(s)"));
    }

    #[test]
    fn test_map_builtin_requires_pairs() {
        let rt = Runtime::new();
        let err = exec(&rt, vec![call("map", vec![text("k")])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        let m = exec(&rt, vec![call("map", vec![text("k"), num(1.0)])]).unwrap();
        let mut expected = HashMap::new();
        expected.insert("k".to_string(), Value::from(1.0));
        assert_eq!(m, Value::map(expected));
    }
}
