#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use tokio_hsm::{
    BoxError, Event, Handled, HsmError, MachineConfig, StateGraphBuilder, StateId, TransitionError,
};

pub type Log = Vec<String>;

#[derive(Debug, Event)]
#[event(reply = "usize")]
pub enum Ev {
    /// Transition to the named state.
    Go(String),
    Stay,
    Fail(String),
    /// Requests a transition to `B`, then fails.
    Sabotage,
    Decline,
    /// Replies with the number of log entries.
    Count,
    /// Posts `Go("B")` from inside the handler.
    Chain,
    Nothing,
}

pub struct Tree {
    pub builder: StateGraphBuilder<Log, Ev>,
    pub top: StateId,
    pub a: StateId,
    pub a1: StateId,
    pub a11: StateId,
    pub a2: StateId,
    pub a21: StateId,
    pub b: StateId,
}

/// Top > A > {A1 > A11, A2 > A21}, Top > B, with Top -> A -> A1 -> A11 as initial chain.
///
/// Every state logs `enter X` / `exit X`. Callbacks whose label is listed in `failing` log
/// and then fail. The top state handles every event except `Nothing`.
pub fn tree(failing: &[&str]) -> Tree {
    let mut builder = StateGraphBuilder::<Log, Ev>::new("Top");
    let top = builder.top();
    let a = builder.state("A", top).unwrap();
    let a1 = builder.state("A1", a).unwrap();
    let a11 = builder.state("A11", a1).unwrap();
    let a2 = builder.state("A2", a).unwrap();
    let a21 = builder.state("A21", a2).unwrap();
    let b = builder.state("B", top).unwrap();
    builder.initial(top, a).unwrap();
    builder.initial(a, a1).unwrap();
    builder.initial(a1, a11).unwrap();

    for (state, name) in [
        (top, "Top"),
        (a, "A"),
        (a1, "A1"),
        (a11, "A11"),
        (a2, "A2"),
        (a21, "A21"),
        (b, "B"),
    ] {
        let entry = format!("enter {name}");
        let entry_fails = failing.contains(&entry.as_str());
        builder
            .on_entry(state, move |m| {
                let label = entry.clone();
                Box::pin(async move {
                    m.context_mut().push(label.clone());
                    if entry_fails {
                        return Err(BoxError::from(format!("{label} failed")));
                    }
                    Ok(())
                })
            })
            .unwrap();

        let exit = format!("exit {name}");
        let exit_fails = failing.contains(&exit.as_str());
        builder
            .on_exit(state, move |m| {
                let label = exit.clone();
                Box::pin(async move {
                    m.context_mut().push(label.clone());
                    if exit_fails {
                        return Err(BoxError::from(format!("{label} failed")));
                    }
                    Ok(())
                })
            })
            .unwrap();
    }

    builder
        .on(top, "Go", |m, e| {
            Box::pin(async move {
                let Ev::Go(name) = e else {
                    return Err(m.unhandled());
                };
                let target = m
                    .state(name)
                    .ok_or_else(|| format!("no state named {name}"))?;
                Ok(Handled::Transition(target))
            })
        })
        .unwrap()
        .on(top, "Stay", |m, _e| {
            Box::pin(async move {
                let label = format!("stay in {}", m.current_state_name());
                m.context_mut().push(label);
                Ok(Handled::Stay)
            })
        })
        .unwrap()
        .on(top, "Fail", |_m, e| {
            Box::pin(async move {
                match e {
                    Ev::Fail(reason) => Err(BoxError::from(reason.as_str())),
                    _ => Ok(Handled::Stay),
                }
            })
        })
        .unwrap()
        .on(top, "Sabotage", move |m, _e| {
            Box::pin(async move {
                m.transition(b);
                Err(BoxError::from("sabotaged"))
            })
        })
        .unwrap()
        .on(top, "Decline", |m, _e| Box::pin(async move { Err(m.unhandled()) }))
        .unwrap()
        .on(top, "Count", |m, _e| {
            Box::pin(async move { Ok(Handled::Reply(m.context().len())) })
        })
        .unwrap()
        .on(top, "Chain", |m, _e| {
            Box::pin(async move {
                m.post(Ev::Go("B".into()))?;
                Ok(Handled::Stay)
            })
        })
        .unwrap();

    Tree {
        builder,
        top,
        a,
        a1,
        a11,
        a2,
        a21,
        b,
    }
}

/// Collects errors reported to the dispatch error callback.
#[derive(Clone, Default)]
pub struct Errors(Arc<Mutex<Vec<String>>>);

impl Errors {
    pub fn config(&self) -> MachineConfig {
        let errors = self.clone();
        MachineConfig::new().on_dispatch_error(move |_info, _sink, err| {
            errors.0.lock().unwrap().push(describe(err));
        })
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

pub fn describe(err: &HsmError) -> String {
    match err {
        HsmError::Unhandled(e) => format!("unhandled {} in {}", e.event, e.state),
        HsmError::Handler(e) => format!("handler {} in {}: {}", e.event, e.state, e.cause),
        HsmError::Transition(e) => format!("transition {} of {}", e.callback, e.state),
        HsmError::Fatal(e) => match e.cause.downcast_ref::<TransitionError>() {
            Some(t) => format!("fatal after {} of {}", t.callback, t.state),
            None => format!("fatal: {}", e.cause),
        },
        HsmError::Initialization(e) => format!("initialization {}", e.state),
        other => other.to_string(),
    }
}

pub fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
