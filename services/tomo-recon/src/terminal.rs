//! Operator that asks for calibration values on the terminal.

use std::io::{BufRead, Write};

use tomo_core::{Operator, OperatorRequest, Result, TomoError};

/// Prompts on `output` and reads one integer per line from `input`.
///
/// Answers that do not parse or fall outside the request bounds are
/// rejected and the question is asked again.
pub struct TerminalOperator<R, W> {
    input: R,
    output: W,
}

impl TerminalOperator<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalOperator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn prompt(&mut self, request: &OperatorRequest) -> Result<()> {
        write!(
            self.output,
            "{} [{}..={}]: ",
            request.prompt, request.min, request.max
        )
        .and_then(|_| self.output.flush())
        .map_err(|e| TomoError::Io(e.to_string()))
    }
}

impl<R: BufRead, W: Write> Operator for TerminalOperator<R, W> {
    fn ask(&mut self, request: &OperatorRequest) -> Result<i64> {
        loop {
            self.prompt(request)?;

            let mut line = String::new();
            let read = self
                .input
                .read_line(&mut line)
                .map_err(|e| TomoError::Io(e.to_string()))?;
            if read == 0 {
                return Err(TomoError::input(format!(
                    "input closed before '{}' was answered",
                    request.prompt
                )));
            }

            match line.trim().parse::<i64>() {
                Ok(value) => match request.validate(value) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        let _ = writeln!(self.output, "{}", e);
                    }
                },
                Err(_) => {
                    let _ = writeln!(self.output, "not an integer: '{}'", line.trim());
                }
            }
        }
    }
}
