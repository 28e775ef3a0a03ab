//! Sandboxed Lua state that loads generated chart code and runs its
//! `plotN(df)` routines one at a time.
//!
//! The state has no `os`, `io`, `debug`, `package` or loader functions.
//! Every load and call runs under an instruction budget and a wall-clock
//! timeout enforced from a VM hook.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use mlua::{Function, HookTriggers, Lua, MultiValue, Table, Value, VmState};
use sheetwise_engine::Dataset;

use crate::api::{build_dataset_info, build_df, lua_value_to_string, register_plt, register_stats};
use crate::figure::{new_sink, take_figure, Figure, FigureSink};

/// Default instruction budget for one load or routine call.
pub const INSTRUCTION_LIMIT: u64 = 100_000_000;

/// How often the hook checks the budget and the clock.
pub const INSTRUCTION_HOOK_INTERVAL: u32 = 10_000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of print lines kept
pub const MAX_OUTPUT_LINES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub instruction_limit: u64,
    pub timeout: Duration,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            instruction_limit: INSTRUCTION_LIMIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SandboxError {
    /// The Lua state or its API could not be set up
    Setup(String),
    Syntax(String),
    Runtime(String),
    InstructionLimit(u64),
    Timeout(Duration),
}

impl fmt::Display for SandboxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SandboxError::Setup(msg) => write!(f, "sandbox setup failed: {}", msg),
            SandboxError::Syntax(msg) => write!(f, "syntax error: {}", msg),
            SandboxError::Runtime(msg) => write!(f, "{}", msg),
            SandboxError::InstructionLimit(n) => {
                write!(f, "instruction limit exceeded ({} instructions)", n)
            }
            SandboxError::Timeout(t) => write!(f, "execution timeout ({}s limit)", t.as_secs()),
        }
    }
}

impl std::error::Error for SandboxError {}

impl From<mlua::Error> for SandboxError {
    fn from(e: mlua::Error) -> Self {
        match e {
            mlua::Error::SyntaxError { .. } => SandboxError::Syntax(format_lua_error(&e)),
            other => SandboxError::Runtime(format_lua_error(&other)),
        }
    }
}

pub struct Sandbox {
    lua: Lua,
    figure: FigureSink,
    output: Rc<RefCell<Vec<String>>>,
    limits: Limits,
    /// Globals as they stood after the chunk loaded
    baseline: RefCell<Vec<(Value, Value)>>,
}

impl Sandbox {
    /// Create a state with `plt`, `stats`, `dataset` and `df` installed.
    pub fn new(dataset: &Dataset, limits: Limits) -> Result<Self, SandboxError> {
        let lua = Lua::new();
        let figure = new_sink();
        let output = Rc::new(RefCell::new(Vec::new()));

        Self::install(&lua, dataset, figure.clone(), output.clone())
            .map_err(|e| SandboxError::Setup(format_lua_error(&e)))?;

        Ok(Self {
            lua,
            figure,
            output,
            limits,
            baseline: RefCell::new(Vec::new()),
        })
    }

    fn install(
        lua: &Lua,
        dataset: &Dataset,
        figure: FigureSink,
        output: Rc<RefCell<Vec<String>>>,
    ) -> mlua::Result<()> {
        let globals = lua.globals();

        // Capture print instead of writing to stdout
        let print_fn = lua.create_function(move |_, args: MultiValue| {
            let line = args
                .iter()
                .map(lua_value_to_string)
                .collect::<Vec<_>>()
                .join("\t");
            let mut out = output.borrow_mut();
            if out.len() < MAX_OUTPUT_LINES {
                out.push(line);
            }
            Ok(())
        })?;
        globals.set("print", print_fn)?;

        for name in ["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"] {
            globals.set(name, Value::Nil)?;
        }

        register_plt(lua, figure)?;
        register_stats(lua)?;
        globals.set("dataset", build_dataset_info(lua, dataset)?)?;
        globals.set("df", build_df(lua, dataset)?)?;
        Ok(())
    }

    /// Execute the chunk, defining its functions as globals.
    pub fn load(&self, code: &str) -> Result<(), SandboxError> {
        self.guarded(|| self.lua.load(code).set_name("chart").exec())?;
        let pairs = self
            .lua
            .globals()
            .pairs::<Value, Value>()
            .collect::<mlua::Result<Vec<_>>>()?;
        *self.baseline.borrow_mut() = pairs;
        Ok(())
    }

    /// The `plot1`..`plotN` globals that are functions, in index order.
    pub fn routines(&self, max: usize) -> Vec<(usize, Function)> {
        let globals = self.lua.globals();
        (1..=max)
            .filter_map(|i| match globals.get::<Value>(format!("plot{}", i)) {
                Ok(Value::Function(f)) => Some((i, f)),
                _ => None,
            })
            .collect()
    }

    /// Call one routine against freshly installed globals and return what it
    /// drew. Nothing an earlier routine assigned or broke carries over.
    pub fn run_routine(&self, routine: &Function, dataset: &Dataset) -> Result<Figure, SandboxError> {
        take_figure(&self.figure);
        let df = self.reset_globals(dataset)?;
        let result = self.guarded(|| routine.call::<()>(df));
        let figure = take_figure(&self.figure);
        result.map(|_| figure)
    }

    fn reset_globals(&self, dataset: &Dataset) -> mlua::Result<Table> {
        let globals = self.lua.globals();
        for (key, value) in self.baseline.borrow().iter() {
            globals.raw_set(key.clone(), value.clone())?;
        }
        register_plt(&self.lua, self.figure.clone())?;
        register_stats(&self.lua)?;
        globals.set("dataset", build_dataset_info(&self.lua, dataset)?)?;
        let df = build_df(&self.lua, dataset)?;
        globals.set("df", df.clone())?;
        Ok(df)
    }

    /// Lines printed so far.
    pub fn output(&self) -> Vec<String> {
        self.output.borrow().clone()
    }

    /// Run `f` with the budget hook installed.
    fn guarded<R>(&self, f: impl FnOnce() -> mlua::Result<R>) -> Result<R, SandboxError> {
        let limits = self.limits;
        let start_time = Instant::now();
        let budget = Arc::new(AtomicI64::new(limits.instruction_limit as i64));
        let timed_out = Arc::new(AtomicBool::new(false));

        let budget_clone = budget.clone();
        let timed_out_clone = timed_out.clone();
        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(INSTRUCTION_HOOK_INTERVAL),
            move |_lua, _debug| {
                if start_time.elapsed() > limits.timeout {
                    timed_out_clone.store(true, Ordering::Relaxed);
                    return Err(mlua::Error::RuntimeError(
                        SandboxError::Timeout(limits.timeout).to_string(),
                    ));
                }

                let remaining =
                    budget_clone.fetch_sub(INSTRUCTION_HOOK_INTERVAL as i64, Ordering::Relaxed);
                if remaining <= 0 {
                    Err(mlua::Error::RuntimeError(
                        SandboxError::InstructionLimit(limits.instruction_limit).to_string(),
                    ))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        let result = f();
        self.lua.remove_hook();

        result.map_err(|e| {
            if timed_out.load(Ordering::Relaxed) {
                SandboxError::Timeout(limits.timeout)
            } else if budget.load(Ordering::Relaxed) <= 0 {
                SandboxError::InstructionLimit(limits.instruction_limit)
            } else {
                SandboxError::from(e)
            }
        })
    }
}

/// Format a Lua error for display.
fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => {
            // Strip the "[string \"...\"]:1: " prefix if present
            if let Some(idx) = message.find("]:") {
                message[idx + 2..].trim_start().to_string()
            } else {
                message.clone()
            }
        }
        mlua::Error::RuntimeError(msg) => without_traceback(msg).to_string(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        _ => without_traceback(&error.to_string()).to_string(),
    }
}

fn without_traceback(msg: &str) -> &str {
    match msg.find("\nstack traceback:") {
        Some(idx) => msg[..idx].trim_end(),
        None => msg,
    }
}
