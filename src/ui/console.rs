//! Line-oriented prompts over any reader and writer.

use std::io::{self, BufRead, Write};

pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Console { input, output }
    }

    pub fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")
    }

    /// Reads one trimmed line. End of input is an `UnexpectedEof` error.
    pub fn read_line(&mut self) -> io::Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"));
        }
        Ok(line.trim().to_string())
    }

    pub fn prompt(&mut self, label: &str) -> io::Result<String> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;
        self.read_line()
    }

    /// Empty input keeps `default`.
    pub fn prompt_default(&mut self, label: &str, default: &str) -> io::Result<String> {
        write!(self.output, "{label} [{default}]: ")?;
        self.output.flush()?;
        let answer = self.read_line()?;
        Ok(if answer.is_empty() { default.to_string() } else { answer })
    }

    pub fn confirm(&mut self, label: &str) -> io::Result<bool> {
        loop {
            let answer = self.prompt(&format!("{label} (y/n)"))?;
            match answer.to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.say("Please answer y or n.")?,
            }
        }
    }

    /// Numbered menu. Returns the zero-based index of the chosen option.
    pub fn choose(&mut self, label: &str, options: &[String], default: usize) -> io::Result<usize> {
        self.say(label)?;
        for (i, option) in options.iter().enumerate() {
            self.say(&format!("  {}) {}", i + 1, option))?;
        }
        loop {
            let answer = self.prompt_default("Choice", &(default + 1).to_string())?;
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
                _ => self.say(&format!("Enter a number between 1 and {}.", options.len()))?,
            }
        }
    }

    pub fn output(&mut self) -> &mut W {
        &mut self.output
    }
}
