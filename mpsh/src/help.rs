use crate::lexer::Word;

pub struct CommandHelp {
    pub name: &'static str,
    pub summary: &'static str,
    pub usage: &'static str,
    pub options: &'static [(&'static str, &'static str)],
}

pub const COMMANDS: &[CommandHelp] = &[
    CommandHelp {
        name: "alias",
        summary: "Define or display aliases",
        usage: "alias [name[=template] ...]",
        options: &[
            ("{}", "Next unused argument"),
            ("{N}", "Argument N, counting from 1"),
        ],
    },
    CommandHelp {
        name: "cat",
        summary: "Print file contents",
        usage: "cat FILE...",
        options: &[],
    },
    CommandHelp {
        name: "cd",
        summary: "Change the working directory of the side a path names",
        usage: "cd [DIR]",
        options: &[],
    },
    CommandHelp {
        name: "cp",
        summary: "Copy files on one side",
        usage: "cp [-rv] SOURCE... DEST",
        options: &[
            ("-r, --recursive", "Copy directories recursively"),
            ("-v, --verbose", "Print each file as it is copied"),
        ],
    },
    CommandHelp {
        name: "df",
        summary: "Show board filesystem usage",
        usage: "df [PATH]...",
        options: &[],
    },
    CommandHelp {
        name: "echo",
        summary: "Print text with prompt placeholders expanded",
        usage: "echo [-n] [TEXT]...",
        options: &[("-n", "Do not output trailing newline")],
    },
    CommandHelp {
        name: "edit",
        summary: "Edit a board file with the local editor",
        usage: "edit FILE...",
        options: &[],
    },
    CommandHelp {
        name: "eval",
        summary: "Evaluate an expression on the board and print its value",
        usage: "eval EXPR",
        options: &[],
    },
    CommandHelp {
        name: "exec",
        summary: "Execute statements on the board",
        usage: "exec CODE",
        options: &[("\\n", "Statement separator inside CODE")],
    },
    CommandHelp {
        name: "free",
        summary: "Show board heap usage",
        usage: "free",
        options: &[],
    },
    CommandHelp {
        name: "fs",
        summary: "Run a filesystem command: cat, ls, cp, rm, mkdir or rmdir",
        usage: "fs COMMAND [ARG]...",
        options: &[],
    },
    CommandHelp {
        name: "gc",
        summary: "Run a garbage collection and show heap usage",
        usage: "gc",
        options: &[],
    },
    CommandHelp {
        name: "get",
        summary: "Copy board files to the local filesystem",
        usage: "get [-rvn] SOURCE... [:DEST]",
        options: &[
            ("-r, --recursive", "Copy directories recursively"),
            ("-v, --verbose", "Print each file as it is copied"),
            ("-n, --dry-run", "Show what would be copied"),
        ],
    },
    CommandHelp {
        name: "help",
        summary: "Show help for commands",
        usage: "help [COMMAND]",
        options: &[],
    },
    CommandHelp {
        name: "include",
        summary: "Run the commands in a local file",
        usage: "include FILE...",
        options: &[],
    },
    CommandHelp {
        name: "lcd",
        summary: "Change or print the local working directory",
        usage: "lcd [DIR]",
        options: &[],
    },
    CommandHelp {
        name: "ls",
        summary: "List directory contents",
        usage: "ls [-lR] [PATH]...",
        options: &[
            ("-l, --long", "Show size and modification time"),
            ("-R, --recursive", "List subdirectories recursively"),
        ],
    },
    CommandHelp {
        name: "mkdir",
        summary: "Create directories",
        usage: "mkdir [-p] DIR...",
        options: &[("-p, --parents", "Create missing parents, ignore existing")],
    },
    CommandHelp {
        name: "mount",
        summary: "Show a local directory to board paths under /remote",
        usage: "mount [DIR]",
        options: &[],
    },
    CommandHelp {
        name: "mv",
        summary: "Move or rename files on one side",
        usage: "mv [-v] SOURCE... DEST",
        options: &[("-v, --verbose", "Print each rename")],
    },
    CommandHelp {
        name: "put",
        summary: "Copy local files to the board",
        usage: "put [-rvn] SOURCE... [:DEST]",
        options: &[
            ("-r, --recursive", "Copy directories recursively"),
            ("-v, --verbose", "Print each file as it is copied"),
            ("-n, --dry-run", "Show what would be copied"),
        ],
    },
    CommandHelp {
        name: "pwd",
        summary: "Print the board working directory",
        usage: "pwd",
        options: &[],
    },
    CommandHelp {
        name: "reset",
        summary: "Soft reset the board",
        usage: "reset",
        options: &[],
    },
    CommandHelp {
        name: "rm",
        summary: "Remove files",
        usage: "rm [-rv] PATH...",
        options: &[
            ("-r, --recursive", "Remove directories and their contents"),
            ("-v, --verbose", "Print each removed path"),
        ],
    },
    CommandHelp {
        name: "rmdir",
        summary: "Remove empty directories",
        usage: "rmdir DIR...",
        options: &[],
    },
    CommandHelp {
        name: "run",
        summary: "Run a local script on the board",
        usage: "run FILE...",
        options: &[],
    },
    CommandHelp {
        name: "set",
        summary: "Show or change shell options",
        usage: "set [key=value ...]",
        options: &[
            ("prompt", "Prompt template for magic mode"),
            ("promptcolour", "Colour of the board's own prompt"),
            ("name", "Display name for this board"),
            ("names", "JSON object of unique id to name"),
            ("lscolour", "JSON object of extra ls colours"),
            ("missing", "Text for unknown placeholders"),
        ],
    },
    CommandHelp {
        name: "shell",
        summary: "Run a command in the local shell",
        usage: "shell COMMAND",
        options: &[],
    },
    CommandHelp {
        name: "time",
        summary: "Show or set the board clock",
        usage: "time [set [utc]]",
        options: &[],
    },
    CommandHelp {
        name: "touch",
        summary: "Create empty files",
        usage: "touch FILE...",
        options: &[],
    },
    CommandHelp {
        name: "umount",
        summary: "Remove the local directory shown under /remote",
        usage: "umount",
        options: &[],
    },
    CommandHelp {
        name: "uname",
        summary: "Print board system information",
        usage: "uname",
        options: &[],
    },
    CommandHelp {
        name: "unalias",
        summary: "Remove aliases",
        usage: "unalias NAME...",
        options: &[],
    },
];

pub fn get_help(name: &str) -> Option<&'static CommandHelp> {
    COMMANDS.iter().find(|c| c.name == name)
}

pub fn format_help(cmd: &CommandHelp) -> String {
    let mut out = format!("{} - {}\n\nUsage: {}\n", cmd.name, cmd.summary, cmd.usage);
    if !cmd.options.is_empty() {
        out.push_str("\nOptions:\n");
        for (opt, desc) in cmd.options {
            out.push_str(&format!("  {opt:16} {desc}\n"));
        }
    }
    out
}

pub fn format_help_list() -> String {
    let mut out = String::from("mpsh - MicroPython Shell Commands\n\n");
    out.push_str("Lines starting with % are shell commands, lines starting with ! go to\n");
    out.push_str("the local shell and anything else is sent to the board's REPL.\n");
    out.push_str("Separate commands with ';'. Board paths start with ':'.\n\n");
    out.push_str("Available commands:\n\n");
    for cmd in COMMANDS {
        out.push_str(&format!("  {:12} {}\n", cmd.name, cmd.summary));
    }
    out.push_str("\nUse 'help COMMAND' or 'COMMAND --help' for more information.\n");
    out
}

/// Help is asked for with `-h` or `--help` as the first operand.
pub fn wants_help(args: &[Word]) -> bool {
    args.first()
        .is_some_and(|a| !a.quoted && (a.text == "--help" || a.text == "-h"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_help() {
        let text = format_help(get_help("rm").unwrap());
        assert!(text.starts_with("rm - Remove files"));
        assert!(text.contains("Usage: rm [-rv] PATH..."));
        assert!(text.contains("-r, --recursive"));
    }

    #[test]
    fn test_help_list_names_every_command() {
        let list = format_help_list();
        for cmd in COMMANDS {
            assert!(list.contains(cmd.name));
        }
    }

    #[test]
    fn test_wants_help() {
        assert!(wants_help(&[Word::new("--help")]));
        assert!(!wants_help(&[Word::new("x"), Word::new("-h")]));
        assert!(!wants_help(&[Word::quoted("-h")]));
        assert!(!wants_help(&[]));
    }
}
