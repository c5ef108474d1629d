// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Background scheduling of translation and assembly.
//!
//! Each stage runs at most one job at a time, on its own thread. Submitting
//! new work cancels the in-flight job cooperatively (the token is polled at
//! statement/instruction granularity) and bumps a generation counter; a
//! superseded job's result is discarded when it finally lands. A failed run
//! records its error but keeps the previous successful artifact. Reading an
//! artifact while its stage is busy yields `None`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::assembler;
use crate::translator;

/// Shared cancellation flag, polled by long-running work.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

struct StageState<T> {
    generation: u64,
    busy: bool,
    artifact: Option<T>,
    error: Option<String>,
}

struct Stage<T> {
    state: Arc<Mutex<StageState<T>>>,
    cancel: Option<CancelToken>,
}

impl<T: Clone + Send + 'static> Stage<T> {
    fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(StageState {
                generation: 0,
                busy: false,
                artifact: None,
                error: None,
            })),
            cancel: None,
        }
    }

    fn submit<F>(&mut self, job: F)
    where
        F: FnOnce(&CancelToken) -> Result<T, String> + Send + 'static,
    {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        let token = CancelToken::new();
        self.cancel = Some(token.clone());

        let generation = {
            let mut st = self.state.lock().expect("stage state poisoned");
            st.generation += 1;
            st.busy = true;
            st.generation
        };

        let state = Arc::clone(&self.state);
        thread::spawn(move || {
            let result = job(&token);
            let mut st = state.lock().expect("stage state poisoned");
            if st.generation != generation {
                // superseded; a newer submission owns the state now
                return;
            }
            match result {
                Ok(artifact) => {
                    st.artifact = Some(artifact);
                    st.error = None;
                }
                Err(message) => st.error = Some(message),
            }
            st.busy = false;
        });
    }

    fn busy(&self) -> bool {
        self.state.lock().expect("stage state poisoned").busy
    }

    fn artifact(&self) -> Option<T> {
        let st = self.state.lock().expect("stage state poisoned");
        if st.busy {
            return None;
        }
        st.artifact.clone()
    }

    fn error(&self) -> Option<String> {
        let st = self.state.lock().expect("stage state poisoned");
        if st.busy {
            return None;
        }
        st.error.clone()
    }
}

/// Owner of the two pipeline stages.
pub struct WorkScheduler {
    compile: Stage<String>,
    assemble: Stage<Vec<u8>>,
}

impl WorkScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            compile: Stage::new(),
            assemble: Stage::new(),
        }
    }

    /// Queue a translation run, cancelling any run still in flight.
    pub fn submit_compile(&mut self, source: String) {
        self.compile.submit(move |cancel| {
            translator::translate_with_cancel(&source, cancel).map_err(|e| e.to_string())
        });
    }

    /// Queue an assembly run, cancelling any run still in flight.
    pub fn submit_assemble(&mut self, casm: String) {
        self.assemble.submit(move |cancel| {
            assembler::assemble_with_cancel(&casm, cancel).map_err(|e| e.to_string())
        });
    }

    #[must_use]
    pub fn is_compiling(&self) -> bool {
        self.compile.busy()
    }

    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.assemble.busy()
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.is_compiling() || self.is_assembling()
    }

    /// Last successful translation, or `None` while a run is in flight.
    #[must_use]
    pub fn casm_text(&self) -> Option<String> {
        self.compile.artifact()
    }

    /// Last successful assembly, or `None` while a run is in flight.
    #[must_use]
    pub fn bytecode(&self) -> Option<Vec<u8>> {
        self.assemble.artifact()
    }

    #[must_use]
    pub fn compile_error(&self) -> Option<String> {
        self.compile.error()
    }

    #[must_use]
    pub fn assemble_error(&self) -> Option<String> {
        self.assemble.error()
    }
}

impl Default for WorkScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelToken, WorkScheduler};
    use crate::translator::translate;
    use std::thread;
    use std::time::{Duration, Instant};

    // 200 declarations plus a pile of assignments; enough work to keep a
    // translation run observable from the submitting thread
    fn big_program(prefix: char) -> String {
        let mut names = Vec::new();
        for a in b'A'..=b'J' {
            for b in b'A'..=b'T' {
                names.push(format!("{prefix}{}{}", a as char, b as char));
            }
        }
        let mut big = String::new();
        for (i, name) in names.iter().enumerate() {
            big.push_str(&format!("VAR {name} = {i}\n"));
        }
        for _ in 0..10 {
            for name in &names {
                big.push_str(&format!("{name} = {name} + 1\n"));
            }
        }
        big
    }

    fn wait_while<F: Fn() -> bool>(cond: F) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while cond() {
            assert!(Instant::now() < deadline, "scheduler timed out");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn compile_produces_the_translator_output() {
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_compile("VAR x = 5".to_string());
        wait_while(|| scheduler.is_compiling());
        let expected = translate("VAR x = 5").expect("translates");
        assert_eq!(scheduler.casm_text(), Some(expected));
        assert_eq!(scheduler.compile_error(), None);
    }

    #[test]
    fn assemble_produces_bytecode() {
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_assemble("NOP()".to_string());
        wait_while(|| scheduler.is_assembling());
        let bytes = scheduler.bytecode().expect("bytecode ready");
        assert_eq!(bytes.len(), 17);
    }

    #[test]
    fn failed_run_keeps_previous_artifact() {
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_compile("VAR x = 5".to_string());
        wait_while(|| scheduler.is_compiling());
        let good = scheduler.casm_text().expect("first run succeeded");

        scheduler.submit_compile("y = 1".to_string());
        wait_while(|| scheduler.is_compiling());
        assert!(scheduler.compile_error().is_some());
        assert_eq!(scheduler.casm_text(), Some(good));
    }

    #[test]
    fn error_clears_on_next_success() {
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_compile("y = 1".to_string());
        wait_while(|| scheduler.is_compiling());
        assert!(scheduler.compile_error().is_some());

        scheduler.submit_compile("VAR y = 1".to_string());
        wait_while(|| scheduler.is_compiling());
        assert_eq!(scheduler.compile_error(), None);
        assert!(scheduler.casm_text().is_some());
    }

    #[test]
    fn resubmission_wins_over_the_older_run() {
        // A large program keeps the first run busy long enough for the second
        // submission to land; whichever order they finish in, the newest
        // generation owns the published artifact.
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_compile(big_program('Q'));
        scheduler.submit_compile("VAR tiny = 1".to_string());
        wait_while(|| scheduler.is_compiling());
        let expected = translate("VAR tiny = 1").expect("translates");
        assert_eq!(scheduler.casm_text(), Some(expected));
    }

    #[test]
    fn artifacts_hidden_while_busy() {
        let mut scheduler = WorkScheduler::new();
        scheduler.submit_compile(big_program('W'));
        // either the run is still going (artifact hidden) or it already
        // finished (artifact visible); both are legal, never a torn state
        let busy = scheduler.is_compiling();
        if busy {
            assert_eq!(scheduler.casm_text(), None);
        }
        wait_while(|| scheduler.is_compiling());
        assert!(scheduler.casm_text().is_some());
    }
}
