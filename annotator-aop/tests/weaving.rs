//! 端到端织入测试：注册、解析、织入、调用

use annotator_aop::prelude::*;
use annotator_core::ReweavePolicy;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::TRACE)
            .try_init();
    });
}

type Trace = Arc<Mutex<Vec<String>>>;

fn recording_registry(trace: &Trace) -> Registry {
    let mut registry = Registry::new();

    for label in ["A", "B"] {
        let trace = trace.clone();
        registry
            .define_function(
                &format!("mark_{}", label.to_lowercase()),
                Handler::before(move |_, _, _| {
                    trace.lock().push(label.to_string());
                    Ok(())
                }),
            )
            .unwrap();
    }

    for label in ["X", "Y"] {
        let trace = trace.clone();
        registry
            .define_function(
                &format!("suffix_{}", label.to_lowercase()),
                Handler::after(move |_, _, _, result: Value| {
                    trace.lock().push(format!("{} got {}", label, result));
                    Ok(json!(format!("{}{}", result.as_str().unwrap_or_default(), label)))
                }),
            )
            .unwrap();
    }

    for label in ["P", "Q"] {
        let trace = trace.clone();
        registry
            .define_function(
                &format!("gate_{}", label.to_lowercase()),
                Handler::around(move |_, params, options, proceed| {
                    trace.lock().push(format!("{} enter", label));
                    if options.first().map(String::as_str) == Some("deny") {
                        return Ok(json!(format!("{} denied", label)));
                    }
                    params.update("amount", |amount| {
                        *amount = json!(amount.as_i64().unwrap_or_default() + 1);
                    });
                    let result = proceed.proceed();
                    trace.lock().push(format!("{} exit", label));
                    result
                }),
            )
            .unwrap();
    }

    registry
}

fn ledger_table(trace: &Trace) -> ClassTable {
    let table = ClassTable::new();
    let body_trace = trace.clone();
    let order_trace = trace.clone();
    let gate_trace = trace.clone();

    table
        .define(
            ClassDefinition::new("Ledger")
                .method(
                    MethodDescriptor::new("ordered")
                        .static_method()
                        .doc("/**\n * @before mark_a\n * @before mark_b\n */"),
                    move |_, _| {
                        order_trace.lock().push("body".to_string());
                        Ok(Value::Null)
                    },
                )
                .method(
                    MethodDescriptor::new("label")
                        .static_method()
                        .doc("@after suffix_x\n@after suffix_y"),
                    move |_, _| {
                        body_trace.lock().push("body".to_string());
                        Ok(json!("r"))
                    },
                )
                .method(
                    MethodDescriptor::new("post")
                        .static_method()
                        .param(ParameterDescriptor::new("amount").by_reference())
                        .doc("@around gate_p\n@around gate_q"),
                    move |_, args| {
                        gate_trace.lock().push(format!("body {}", args[0]));
                        args[0] = json!(args[0].as_i64().unwrap_or_default() * 10);
                        Ok(json!("posted"))
                    },
                )
                .method(
                    MethodDescriptor::new("refuse")
                        .static_method()
                        .doc("@around gate_p\n@around gate_q deny"),
                    |_, _| Ok(json!("unreachable")),
                ),
        )
        .unwrap();
    table
}

#[test]
fn test_before_runs_in_declaration_order() {
    init_tracing();
    let trace: Trace = Arc::default();
    let registry = recording_registry(&trace);
    let table = ledger_table(&trace);

    Weaver::new(&registry, &table).weave("Ledger").unwrap();
    table.call("Ledger", "ordered", Receiver::Static, vec![]).unwrap();

    assert_eq!(*trace.lock(), vec!["A", "B", "body"]);
}

#[test]
fn test_after_threads_results() {
    init_tracing();
    let trace: Trace = Arc::default();
    let registry = recording_registry(&trace);
    let table = ledger_table(&trace);

    Weaver::new(&registry, &table).weave("Ledger").unwrap();
    let result = table.call("Ledger", "label", Receiver::Static, vec![]).unwrap();

    assert_eq!(result, json!("rXY"));
    assert_eq!(
        *trace.lock(),
        vec!["body", r#"X got "r""#, r#"Y got "rX""#]
    );
}

#[test]
fn test_around_nesting_and_reference_write_back() {
    init_tracing();
    let trace: Trace = Arc::default();
    let registry = recording_registry(&trace);
    let table = ledger_table(&trace);

    Weaver::new(&registry, &table).weave("Ledger").unwrap();

    let mut args = vec![json!(1)];
    let result = table
        .invoke("Ledger", "post", Receiver::Static, &mut args, CallSite::External)
        .unwrap();

    assert_eq!(result, json!("posted"));
    // Q 和 P 各加 1，原方法看到 3 并乘以 10
    assert_eq!(args, vec![json!(30)]);
    assert_eq!(
        *trace.lock(),
        vec!["Q enter", "P enter", "body 3", "P exit", "Q exit"]
    );
}

#[test]
fn test_outer_around_short_circuit() {
    init_tracing();
    let trace: Trace = Arc::default();
    let registry = recording_registry(&trace);
    let table = ledger_table(&trace);

    Weaver::new(&registry, &table).weave("Ledger").unwrap();
    let result = table.call("Ledger", "refuse", Receiver::Static, vec![]).unwrap();

    assert_eq!(result, json!("Q denied"));
    assert_eq!(*trace.lock(), vec!["Q enter"]);
}

#[test]
fn test_woven_instance_method_keeps_contract() {
    init_tracing();
    let mut registry = Registry::new();
    registry
        .register(
            "audited",
            Handler::before(|jp, params, _| {
                anyhow::ensure!(!jp.is_static(), "audited methods need an instance");
                anyhow::ensure!(params.contains("memo"), "memo missing");
                Ok(())
            }),
            AnnotationType::Before,
        )
        .unwrap();

    struct Account {
        balance: Mutex<i64>,
    }

    let table = ClassTable::new();
    table
        .define(
            ClassDefinition::new("Account").method(
                MethodDescriptor::new("deposit")
                    .visibility(Visibility::Protected)
                    .param(ParameterDescriptor::new("amount"))
                    .param(ParameterDescriptor::new("memo").with_default(json!("")))
                    .doc("Deposits money.\n@audited"),
                |receiver, args| {
                    let account = receiver
                        .downcast_ref::<Account>()
                        .ok_or_else(|| anyhow::anyhow!("not an account"))?;
                    let mut balance = account.balance.lock();
                    *balance += args[0].as_i64().unwrap_or_default();
                    Ok(json!(*balance))
                },
            ),
        )
        .unwrap();

    let report = Weaver::new(&registry, &table).weave("Account").unwrap();
    assert_eq!(report.wrapped, vec!["deposit"]);

    let descriptor = table.method("Account", "deposit").unwrap();
    assert!(!descriptor.is_static);
    assert_eq!(descriptor.visibility, Visibility::Protected);
    assert_eq!(descriptor.parameters.len(), 2);

    let account = Receiver::instance(Account {
        balance: Mutex::new(5),
    });
    let result = table
        .invoke(
            "Account",
            "deposit",
            account.clone(),
            &mut vec![json!(10)],
            CallSite::Subclass,
        )
        .unwrap();
    assert_eq!(result, json!(15));

    let err = table
        .call("Account", "deposit", account, vec![json!(1)])
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnnotatorError>(),
        Some(AnnotatorError::NotAccessible { .. })
    ));

    let err = table
        .invoke(
            "Account",
            "deposit",
            Receiver::Static,
            &mut vec![json!(1)],
            CallSite::Internal,
        )
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnnotatorError>(),
        Some(AnnotatorError::MissingReceiver { .. })
    ));
}

#[test]
fn test_advice_errors_propagate_unchanged() {
    init_tracing();
    let mut registry = Registry::new();
    registry
        .define_function(
            "reject",
            Handler::before(|jp, _, options| {
                anyhow::bail!("{} rejected: {}", jp, options.join(" "))
            }),
        )
        .unwrap();

    let table = ClassTable::new();
    table
        .define(ClassDefinition::new("Gate").method(
            MethodDescriptor::new("open")
                .static_method()
                .doc("@before reject closed for maintenance"),
            |_, _| Ok(json!("opened")),
        ))
        .unwrap();

    Weaver::new(&registry, &table).weave("Gate").unwrap();
    let err = table
        .call("Gate", "open", Receiver::Static, vec![])
        .unwrap_err();
    assert_eq!(err.to_string(), "Gate::open rejected: closed for maintenance");
}

#[test]
fn test_reweave_policies() {
    init_tracing();
    let trace: Trace = Arc::default();
    let mut registry = recording_registry(&trace);
    let notes: Trace = Arc::default();
    let seen = notes.clone();
    registry
        .register(
            "note",
            Handler::info(move |class, method, options| {
                seen.lock()
                    .push(format!("{}::{} {}", class, method, options.join(" ")));
                Ok(())
            }),
            AnnotationType::Info,
        )
        .unwrap();
    let table = ledger_table(&trace);
    table
        .define(ClassDefinition::new("Notes").method(
            MethodDescriptor::new("summary")
                .static_method()
                .doc("@note monthly close"),
            |_, _| Ok(Value::Null),
        ))
        .unwrap();

    let first = Weaver::new(&registry, &table).weave("Ledger").unwrap();
    assert_eq!(first.wrapped, vec!["ordered", "label", "post", "refuse"]);
    let first_notes = Weaver::new(&registry, &table).weave("Notes").unwrap();
    assert_eq!(first_notes.info_invocations, 1);

    let second = Weaver::new(&registry, &table).weave("Ledger").unwrap();
    assert!(second.wrapped.is_empty());
    assert_eq!(second.skipped.len(), 4);
    let second_notes = Weaver::new(&registry, &table).weave("Notes").unwrap();
    assert_eq!(second_notes.info_invocations, 0);
    assert_eq!(second_notes.skipped, vec!["summary"]);
    assert_eq!(*notes.lock(), vec!["Notes::summary monthly close"]);

    table.call("Ledger", "ordered", Receiver::Static, vec![]).unwrap();
    assert_eq!(*trace.lock(), vec!["A", "B", "body"]);

    let err = Weaver::new(&registry, &table)
        .with_policy(ReweavePolicy::Error)
        .weave("Notes")
        .unwrap_err();
    assert!(matches!(err, AnnotatorError::AlreadyWoven { .. }));
    assert_eq!(notes.lock().len(), 1);

    let err = Weaver::new(&registry, &table)
        .with_policy(ReweavePolicy::Error)
        .weave("Ledger")
        .unwrap_err();
    assert!(matches!(err, AnnotatorError::AlreadyWoven { .. }));
}

#[test]
fn test_global_registry_with_standard_functions() {
    init_tracing();
    get_global_registry()
        .write()
        .register(
            "tagged_for_test",
            Handler::info(|_, _, _| Ok(())),
            AnnotationType::Info,
        )
        .unwrap();

    let table = ClassTable::new();
    table
        .define(ClassDefinition::new("Report").method(
            MethodDescriptor::new("render")
                .static_method()
                .param(ParameterDescriptor::new("title"))
                .doc("/**\n * @tagged_for_test monthly\n * @before log_entry\n * @after log_exit\n * @around time_call 1000\n */"),
            |_, args| Ok(json!(format!("# {}", args[0].as_str().unwrap_or_default()))),
        ))
        .unwrap();

    let report = weave_class(&table, "Report").unwrap();
    assert_eq!(report.wrapped, vec!["render"]);
    assert_eq!(report.info_invocations, 1);
    assert!(is_wrapped(&table, "Report", "render"));

    let result = table
        .call("Report", "render", Receiver::Static, vec![json!("Q3")])
        .unwrap();
    assert_eq!(result, json!("# Q3"));
}

#[test]
fn test_info_handler_may_register_during_global_weave() {
    init_tracing();
    get_global_registry()
        .write()
        .register(
            "spawns_annotation",
            Handler::info(|_, method, _| {
                get_global_registry().write().register(
                    &format!("spawned_by_{}", method),
                    Handler::before(|_, _, _| Ok(())),
                    AnnotationType::Before,
                )?;
                Ok(())
            }),
            AnnotationType::Info,
        )
        .unwrap();

    let table = ClassTable::new();
    table
        .define(ClassDefinition::new("Bootstrap").method(
            MethodDescriptor::new("setup")
                .static_method()
                .doc("@spawns_annotation"),
            |_, _| Ok(Value::Null),
        ))
        .unwrap();

    let report = weave_class(&table, "Bootstrap").unwrap();
    assert_eq!(report.info_invocations, 1);
    assert!(get_global_registry().read().contains("spawned_by_setup"));
}
