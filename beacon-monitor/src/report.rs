use std::io::{self, Write};

use crate::probe::CheckResult;

/// All check outcomes of one run, in method then URL order.
#[derive(Debug, Clone, Default)]
pub struct Report {
    results: Vec<CheckResult>,
}

impl Report {
    /// Orders results by context. The sort is stable, so results with the
    /// same context keep their arrival order.
    pub fn new(mut results: Vec<CheckResult>) -> Self {
        results.sort_by(|a, b| a.context.cmp(&b.context));
        Self { results }
    }

    pub fn results(&self) -> &[CheckResult] {
        &self.results
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.pass).count()
    }

    pub fn passed(&self) -> bool {
        self.failures() == 0
    }

    /// 0 when every check passed, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        if self.passed() { 0 } else { 1 }
    }

    /// One line per passing check; failures are set off by blank lines so
    /// they stand out in long reports.
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for result in &self.results {
            if result.pass {
                writeln!(out, "{result}")?;
            } else {
                writeln!(out, "\n{result}\n")?;
            }
        }
        out.flush()
    }
}
