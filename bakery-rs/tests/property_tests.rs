use std::collections::HashMap;

use proptest::prelude::*;
use bakery::error::LookupError;
use bakery::executor::ResourceProbe;
use bakery::script::command::{BranchCondition, Command, CommandInfo, CondKind};
use bakery::script::cond::{compare, evaluate, CompareResult, CondEnv};
use bakery::script::escape::{escape, unescape};
use bakery::script::expand::{expand, ExpandContext};
use bakery::script::lexer::{logical_lines, split_statement};
use bakery::script::optimize::optimize;
use bakery::script::stmt::{parse_block, ParseOptions};

// ── Helpers ───────────────────────────────────────────────────────────────────

struct Vars(HashMap<String, String>);

impl ExpandContext for Vars {
    fn var(&self, name: &str) -> Option<String> {
        self.0.get(&name.to_lowercase()).cloned()
    }
}

struct Nothing;

impl ResourceProbe for Nothing {
    fn file_exists(&self, _: &str) -> Result<bool, LookupError> {
        Ok(false)
    }
    fn dir_exists(&self, _: &str) -> Result<bool, LookupError> {
        Ok(false)
    }
    fn ini_section_exists(&self, _: &str, _: &str) -> Result<bool, LookupError> {
        Ok(false)
    }
}

impl CondEnv for Nothing {
    fn probe(&self) -> &dyn ResourceProbe {
        self
    }
    fn var_exists(&self, _: &str) -> bool {
        false
    }
    fn macro_exists(&self, _: &str) -> bool {
        false
    }
}

/// Flatten batches back into their members.
fn flatten(cmds: Vec<Command>) -> Vec<Command> {
    cmds.into_iter()
        .flat_map(|c| match c.info {
            CommandInfo::Batch(members) => members,
            _ => vec![c],
        })
        .collect()
}

fn operand() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<i32>().prop_map(|n| n.to_string()),
        any::<u16>().prop_map(|n| format!("0x{n:X}")),
        prop::collection::vec(0u8..20, 1..4)
            .prop_map(|v| v.iter().map(u8::to_string).collect::<Vec<_>>().join(".")),
        "[A-Za-z][A-Za-z0-9 ]{0,8}",
    ]
}

const COMPARISONS: [CondKind; 6] = [
    CondKind::Equal,
    CondKind::EqualX,
    CondKind::Smaller,
    CondKind::SmallerEqual,
    CondKind::Bigger,
    CondKind::BiggerEqual,
];

// ── Comparison laws ───────────────────────────────────────────────────────────

proptest! {
    /// Every operand equals itself.
    #[test]
    fn compare_is_reflexive(a in operand()) {
        prop_assert_eq!(compare(&a, &a), CompareResult::Equal);
    }
}

proptest! {
    /// Swapping operands mirrors the result.
    #[test]
    fn compare_is_antisymmetric(a in operand(), b in operand()) {
        let mirrored = match compare(&b, &a) {
            CompareResult::Smaller => CompareResult::Bigger,
            CompareResult::Bigger => CompareResult::Smaller,
            other => other,
        };
        prop_assert_eq!(compare(&a, &b), mirrored);
    }
}

proptest! {
    /// Integers compare like integers, whatever their spelling.
    #[test]
    fn integers_compare_numerically(a in any::<i32>(), b in any::<i32>(), zeros in 0usize..3) {
        let padded = if a >= 0 { format!("{}{a}", "0".repeat(zeros)) } else { a.to_string() };
        let expected = match a.cmp(&b) {
            std::cmp::Ordering::Less => CompareResult::Smaller,
            std::cmp::Ordering::Equal => CompareResult::Equal,
            std::cmp::Ordering::Greater => CompareResult::Bigger,
        };
        prop_assert_eq!(compare(&padded, &b.to_string()), expected);
    }
}

proptest! {
    /// Trailing zero components do not change a version.
    #[test]
    fn versions_ignore_trailing_zeros(parts in prop::collection::vec(0u16..1000, 1..4), extra in 1usize..3) {
        let v = parts.iter().map(u16::to_string).collect::<Vec<_>>().join(".");
        let padded = format!("{v}{}", ".0".repeat(extra));
        prop_assert_eq!(compare(&v, &padded), CompareResult::Equal);
    }
}

proptest! {
    /// `Not` flips the result of every comparison, never its operands.
    #[test]
    fn negation_flips_result(a in operand(), b in operand(), idx in 0usize..6) {
        let kind = COMPARISONS[idx];
        let ops = vec![a, b];
        let cond = BranchCondition::new(kind, false, ops.clone());
        let plain = evaluate(&cond, &ops, &Nothing).unwrap();
        let negated = evaluate(&cond.negated(), &ops, &Nothing).unwrap();
        prop_assert_eq!(plain, !negated);
    }
}

// ── Expansion and escapes ─────────────────────────────────────────────────────

proptest! {
    /// Text without `%` or `#` expands to itself.
    #[test]
    fn expansion_identity(s in "[A-Za-z0-9 ,.:_=\\\\-]*") {
        let ctx = Vars(HashMap::from([("a".to_owned(), "x".to_owned())]));
        prop_assert_eq!(expand(&s, &ctx).unwrap(), s);
    }
}

proptest! {
    /// Any literal survives being stored escaped and decoded once.
    #[test]
    fn escaped_literals_decode_once(s in "\\PC*") {
        prop_assert_eq!(unescape(&escape(&s)), s);
    }
}

proptest! {
    /// A stored escaped value is expanded but not decoded by `expand`.
    #[test]
    fn stored_values_are_not_rescanned(s in "[A-Za-z0-9%#$ ]{0,16}") {
        let ctx = Vars(HashMap::from([("v".to_owned(), escape(&s))]));
        prop_assert_eq!(unescape(&expand("%V%", &ctx).unwrap()), s);
    }
}

// ── Lexer ─────────────────────────────────────────────────────────────────────

proptest! {
    /// The lexer never panics; it returns statements or errors.
    #[test]
    fn lexer_does_not_panic(lines in prop::collection::vec("\\PC*", 0..8)) {
        let numbered: Vec<(usize, &str)> = lines.iter().enumerate().map(|(i, l)| (i + 1, l.as_str())).collect();
        let (logical, _) = logical_lines(numbered);
        for l in logical {
            let _ = split_statement(&l.text, l.line);
        }
    }
}

// ── Batching ──────────────────────────────────────────────────────────────────

fn ini_command() -> impl Strategy<Value = String> {
    (0usize..2, 0usize..3, 0usize..3, 0usize..3).prop_map(|(file, op, key, val)| {
        let file = ["a.ini", "b.ini"][file];
        match op {
            0 => format!("IniWrite,{file},S,K{key},{val}"),
            1 => format!("IniRead,{file},S,K{key},%V{val}%"),
            _ => format!("IniDelete,{file},S,K{key}"),
        }
    })
}

proptest! {
    /// Batching regroups commands without reordering, dropping or adding any.
    #[test]
    fn batching_preserves_order(cmds in prop::collection::vec(ini_command(), 0..12)) {
        let src = cmds.join("\n");
        let parsed = parse_block(&src, &ParseOptions::default()).unwrap();
        let batched = optimize(parsed.clone());
        prop_assert!(batched.len() <= parsed.len());
        prop_assert_eq!(flatten(batched), parsed);
    }
}
