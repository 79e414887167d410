use annotator_aop::prelude::*;
use annotator_aop::weave_class_with_config;
use annotator_core::prelude::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::path::Path;

// ==================== 编译期提交的注解 ====================

inventory::submit! {
    AnnotationRegistration::new("route", AnnotationType::Info, || {
        Handler::info(|class, method, options| {
            tracing::info!("📮 Route {} -> {}::{}", options.join(" "), class, method);
            Ok(())
        })
    })
}

inventory::submit! {
    FunctionRegistration::new("require_positive", || {
        Handler::before(|join_point, params, options| {
            let field = options.first().map(String::as_str).unwrap_or("amount");
            let value = params.get(field).and_then(|v| v.as_i64()).unwrap_or_default();
            if value <= 0 {
                anyhow::bail!("{}: ${} must be positive, got {}", join_point, field, value);
            }
            Ok(())
        })
    })
}

// ==================== 业务类 ====================

struct Account {
    owner: String,
    balance: Mutex<i64>,
}

fn account(receiver: &Receiver) -> Result<&Account> {
    receiver
        .downcast_ref::<Account>()
        .ok_or_else(|| anyhow!("receiver is not an Account"))
}

fn define_account(table: &ClassTable) -> AnnotatorResult<()> {
    table.define(
        ClassDefinition::new("Account")
            .method(
                MethodDescriptor::new("deposit")
                    .param(ParameterDescriptor::new("amount"))
                    .doc(
                        "/**\n\
                         * Adds money to the account.\n\
                         *\n\
                         * @route POST /deposit\n\
                         * @before require_positive amount\n\
                         * @before log_entry\n\
                         * @after log_exit\n\
                         */",
                    ),
                |receiver, args| {
                    let account = account(receiver)?;
                    let mut balance = account.balance.lock();
                    *balance += args[0].as_i64().unwrap_or_default();
                    Ok(json!(*balance))
                },
            )
            .method(
                MethodDescriptor::new("withdraw")
                    .param(ParameterDescriptor::new("amount"))
                    .param(ParameterDescriptor::new("attempts").by_reference().with_default(json!(0)))
                    .doc("@audit withdrawals\n@around time_call 200"),
                |receiver, args| {
                    let account = account(receiver)?;
                    args[1] = json!(args[1].as_i64().unwrap_or_default() + 1);
                    let amount = args[0].as_i64().unwrap_or_default();
                    let mut balance = account.balance.lock();
                    if amount > *balance {
                        return Ok(json!({ "ok": false, "balance": *balance }));
                    }
                    *balance -= amount;
                    Ok(json!({ "ok": true, "balance": *balance }))
                },
            )
            .method(
                MethodDescriptor::new("owner").doc("@route GET /owner"),
                |receiver, _| Ok(json!(account(receiver)?.owner)),
            )
            .method(
                MethodDescriptor::new("fee")
                    .static_method()
                    .param(ParameterDescriptor::new("amount"))
                    .param(ParameterDescriptor::new("rate").with_default(json!(0.01)))
                    .doc("Fee charged on a transfer, no advice."),
                |_, args| {
                    let amount = args[0].as_f64().unwrap_or_default();
                    let rate = args[1].as_f64().unwrap_or_default();
                    Ok(json!(amount * rate))
                },
            ),
    )
}

/// 运行期注册的环绕注解：记录审计标签，失败时返回统一结果
fn register_audit() -> AnnotatorResult<()> {
    get_global_registry().write().register(
        "audit",
        Handler::around(|join_point, params, options, proceed| {
            let tag = options.first().map(String::as_str).unwrap_or("general");
            tracing::info!("🔷 Audit[{}] {} {}", tag, join_point, params.snapshot());
            match proceed.proceed() {
                Ok(result) => Ok(result),
                Err(e) => {
                    tracing::warn!("⚠️ Audit[{}] {} failed: {:#}", tag, join_point, e);
                    Ok(json!({ "ok": false, "error": e.to_string() }))
                }
            }
        }),
        AnnotationType::Around,
    )
}

fn load_config() -> Result<AnnotatorConfig> {
    let config = match std::env::args().nth(1) {
        Some(path) => AnnotatorConfig::from_file(&path)
            .with_context(|| format!("Failed to load config '{}'", path))?,
        None if Path::new("annotator.toml").exists() => {
            AnnotatorConfig::from_file("annotator.toml")?
        }
        None => AnnotatorConfig::default(),
    };
    Ok(config.with_env_overrides()?)
}

// ==================== 主程序 ====================

fn main() -> Result<()> {
    let config = load_config()?;
    config.logging.clone().init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║        Annotator - Ledger Weaving Demo            ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    register_audit()?;

    let table = ClassTable::new();
    define_account(&table)?;

    let report = weave_class_with_config(&table, "Account", &config)?;
    println!("📦 Weave report:\n{}\n", serde_json::to_string_pretty(&report)?);

    let alice = Receiver::instance(Account {
        owner: "alice".to_string(),
        balance: Mutex::new(100),
    });

    let owner = table.call("Account", "owner", alice.clone(), vec![])?;
    println!("👤 Owner: {}", owner);

    let balance = table.call("Account", "deposit", alice.clone(), vec![json!(50)])?;
    println!("💰 Balance after deposit: {}", balance);

    match table.call("Account", "deposit", alice.clone(), vec![json!(-5)]) {
        Ok(value) => println!("   Unexpected deposit result: {}", value),
        Err(e) => println!("🚫 Rejected deposit: {}", e),
    }

    let mut args: Vec<Value> = vec![json!(120)];
    let result = table.invoke("Account", "withdraw", alice.clone(), &mut args, CallSite::External)?;
    println!("🏧 Withdraw: {} (attempts: {})", result, args[1]);

    let result = table.invoke("Account", "withdraw", alice, &mut args, CallSite::External)?;
    println!("🏧 Withdraw again: {} (attempts: {})", result, args[1]);

    let fee = table.call("Account", "fee", Receiver::Static, vec![json!(250)])?;
    println!("🧾 Fee on 250: {}", fee);

    for method in ["deposit", "withdraw", "owner", "fee"] {
        println!(
            "   {:<10} wrapped: {}",
            method,
            is_wrapped(&table, "Account", method)
        );
    }

    // 第二次织入按配置处理已织入的方法
    let again = weave_class_with_config(&table, "Account", &config)?;
    println!("\n🔁 Re-weave skipped: {:?}", again.skipped);

    Ok(())
}
