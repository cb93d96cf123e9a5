//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::Cli;

fn write_completions(shell: Shell, out: &mut dyn Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, out);
}

/// Generate shell completions to stdout.
pub(crate) fn cmd_completions(shell: Shell) {
    write_completions(shell, &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completions(shell: Shell) -> String {
        let mut buf = Vec::new();
        write_completions(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_completions_mention_subcommands() {
        for shell in [Shell::Bash, Shell::Zsh, Shell::Fish] {
            let output = completions(shell);
            assert!(output.contains("mothflash"), "{shell}");
            assert!(output.contains("upload"), "{shell}");
            assert!(output.contains("serial-number"), "{shell}");
        }
    }

    #[test]
    fn test_completions_other_shells_generate_output() {
        assert!(!completions(Shell::PowerShell).is_empty());
        assert!(!completions(Shell::Elvish).is_empty());
    }
}
