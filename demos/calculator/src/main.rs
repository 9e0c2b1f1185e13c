//! Calculator Demo
//!
//! Three middleware cooperate on the `calc.*` events:
//!
//! ```text
//! calc.div  (-10) Guard::check_divisor    observer, rejects a zero divisor
//! calc.*      (0) Calculator::<op>        primary, produces the result
//! calc.*     (10) Audit::record           observer, logs the result
//! *.*       (100) Audit::count            untyped observer, counts fires
//! ```
//!
//! The operation is invoked through a proxy, so the whole chain runs even
//! though the caller only names `Calculator`'s method.
//!
//! # Usage
//!
//! ```bash
//! cargo run --package calculator -- mul 6 7
//! cargo run --package calculator -- div 1 0 --explain --verbose
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use eventware::prelude::*;
use tracing::{info, warn};

type Operands = (i64, i64);

// ============================================================================
// Middleware
// ============================================================================

struct Calculator;

impl Calculator {
    fn add(&self, &(a, b): &Operands) -> HandlerResult<i64> {
        a.checked_add(b).ok_or_else(|| "overflow".into())
    }

    fn sub(&self, &(a, b): &Operands) -> HandlerResult<i64> {
        a.checked_sub(b).ok_or_else(|| "overflow".into())
    }

    fn mul(&self, &(a, b): &Operands) -> HandlerResult<i64> {
        a.checked_mul(b).ok_or_else(|| "overflow".into())
    }

    fn div(&self, &(a, b): &Operands) -> HandlerResult<i64> {
        a.checked_div(b).ok_or_else(|| "undefined quotient".into())
    }
}

impl Middleware for Calculator {
    fn register(table: &mut HandlerTable<Self>) {
        table
            .implement("add", "calc.add", 0, Self::add)
            .implement("sub", "calc.sub", 0, Self::sub)
            .implement("mul", "calc.mul", 0, Self::mul)
            .implement("div", "calc.div", 0, Self::div);
    }
}

/// Rejects a division before the primary runs.
struct Guard;

impl Guard {
    fn check_divisor(&self, ctx: &mut EventContext, &(_, b): &Operands) -> HandlerResult {
        if b == 0 {
            return Err("refusing to divide by zero".into());
        }
        ctx.insert("divisor_checked", true);
        Ok(())
    }
}

impl Middleware for Guard {
    fn register(table: &mut HandlerTable<Self>) {
        table.observe("check_divisor", "calc.div", -10, Self::check_divisor);
    }
}

#[derive(Default)]
struct Audit {
    fires: AtomicUsize,
}

impl Audit {
    fn record(&self, ctx: &mut EventContext, &(a, b): &Operands) -> HandlerResult {
        let checked = ctx.get::<bool>("divisor_checked").copied().unwrap_or(false);
        info!(
            event = %ctx.event(),
            a,
            b,
            result = ?ctx.result::<i64>(),
            checked,
            "Computed"
        );
        Ok(())
    }

    fn count(&self, _ctx: &mut EventContext, _args: &dyn std::any::Any) -> HandlerResult {
        self.fires.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Middleware for Audit {
    fn register(table: &mut HandlerTable<Self>) {
        table
            .observe("record", "calc.*", 10, Self::record)
            .observe_any("count", "*.*", 100, Self::count);
    }

    fn on_remove(&self) {
        info!(fires = self.fires.load(Ordering::Relaxed), "Audit detached");
    }
}

// ============================================================================
// Command Line
// ============================================================================

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn method(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "calculator", about = "Evaluate one operation through eventware")]
struct Args {
    #[arg(value_enum)]
    op: Op,

    #[arg(allow_hyphen_values = true)]
    lhs: i64,

    #[arg(allow_hyphen_values = true)]
    rhs: i64,

    /// Configuration file (defaults to ./eventware.toml when present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Configuration profile.
    #[arg(long)]
    profile: Option<String>,

    /// Log at debug level.
    #[arg(short, long)]
    verbose: bool,

    /// Print the handler chain before running it.
    #[arg(long)]
    explain: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut builder = EventwareRuntime::builder();
    if let Some(path) = &args.config {
        builder = builder.config_file(path);
    }
    if let Some(profile) = &args.profile {
        builder = builder.profile(profile);
    }
    if args.verbose {
        builder = builder.set("logging.level", "debug");
    }
    let runtime = builder.build().context("failed to build runtime")?;

    let calculator = Arc::new(Calculator);
    let guard = Arc::new(Guard);
    let audit = Arc::new(Audit::default());

    let calculator_id = runtime.add(&calculator)?;
    runtime.add(&guard)?;
    let audit_id = runtime.add(&audit)?;

    let proxy = runtime
        .manager()
        .proxy::<Operands, i64>(calculator_id, args.op.method())?;

    if args.explain {
        let chain = runtime.manager().chain_for(proxy.event().as_str())?;
        println!("{}:", chain.event());
        for entry in chain.entries() {
            println!(
                "  {:>5}  {:<8} {}",
                entry.priority(),
                entry.role().as_str(),
                entry.label()
            );
        }
    }

    match proxy.call((args.lhs, args.rhs)) {
        Ok(value) => println!("{value}"),
        Err(e) => {
            warn!(error = %e, "Evaluation failed");
            return Err(e.into());
        }
    }

    runtime.remove(audit_id);
    info!(stats = ?runtime.stats(), "Done");
    Ok(())
}
