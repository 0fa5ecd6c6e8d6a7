//! Scenario extraction from ticket description text.
//!
//! Descriptions are free prose, so extraction runs in two passes. The primary
//! pass looks for explicit `Scenario N:` markers and reads a title and a run
//! of Given/When/Then steps out of each block. When a description never names
//! its scenarios, a fallback pass groups bare keyword lines into blocks
//! instead. Both passes drop what they cannot use rather than failing.

use regex::Regex;

/// One scenario recovered from ticket text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Title from the block, or a synthesized `Scenario N` when the block
    /// has none. Never empty.
    pub name: String,
    /// Step lines with their leading keyword kept, excluding the
    /// expected-result clause.
    pub steps: Vec<String>,
    /// The final outcome step plus its continuations, joined with newlines.
    pub expected_result: String,
}

const STEP_KEYWORDS: [&str; 5] = ["given", "when", "then", "and", "but"];

/// Extract scenarios from a ticket description. Pure; empty or unusable
/// input yields an empty list, never an error.
pub fn parse_scenarios(text: &str) -> Vec<Scenario> {
    let scenarios = parse_marker_blocks(text);
    if scenarios.is_empty() {
        return parse_keyword_blocks(text);
    }
    scenarios
}

/// Primary pass: split the text at `Scenario N:` markers and parse each
/// block. Text before the first marker is ignored.
fn parse_marker_blocks(text: &str) -> Vec<Scenario> {
    // The tail alternation keeps the bare word boundary-matched: digits may
    // glue on directly ("Scenario1:"), but "scenarios" is not a marker.
    let marker =
        Regex::new(r"(?i)\bscenario(?:[ \t]*\d+|\b)[ \t]*:?").expect("regex for scenario marker");
    let bounds: Vec<(usize, usize)> = marker
        .find_iter(text)
        .map(|m| (m.start(), m.end()))
        .collect();

    let mut scenarios = Vec::new();
    for (idx, &(_, body_start)) in bounds.iter().enumerate() {
        let body_end = bounds.get(idx + 1).map_or(text.len(), |next| next.0);
        let number = marker_number(&text[..body_start]);
        if let Some(scenario) = parse_block(&text[body_start..body_end], number, idx + 1) {
            scenarios.push(scenario);
        }
    }
    scenarios
}

/// Digits carried by the marker that ends at the given prefix, if any.
fn marker_number(prefix: &str) -> Option<u32> {
    let digits: Vec<char> = prefix
        .chars()
        .rev()
        .skip_while(|c| *c == ':' || c.is_whitespace())
        .take_while(char::is_ascii_digit)
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.iter().rev().collect::<String>().parse().ok()
}

/// Parse one marker block: title lines up to the first step line, then step
/// lines. Blocks that never produce a step are dropped.
fn parse_block(block: &str, number: Option<u32>, ordinal: usize) -> Option<Scenario> {
    let mut title_lines: Vec<&str> = Vec::new();
    let mut steps: Vec<String> = Vec::new();
    let mut in_steps = false;

    for raw in block.lines() {
        let line = raw.trim();
        if step_keyword(line).is_some() {
            in_steps = true;
            steps.push(line.to_string());
        } else if !in_steps && !line.is_empty() {
            title_lines.push(line);
        }
        // Stray prose between steps is skipped, not a block terminator.
    }

    if steps.is_empty() {
        return None;
    }

    let name = if title_lines.is_empty() {
        match number {
            Some(n) => format!("Scenario {n}"),
            None => format!("Scenario {ordinal}"),
        }
    } else {
        title_lines.join(" ")
    };

    let (steps, expected_result) = split_expected(steps);
    Some(Scenario {
        name,
        steps,
        expected_result,
    })
}

/// Fallback pass: group When-led keyword runs into anonymous scenarios.
/// A blank line or a new `When` closes the current block; blocks without a
/// `Then` are dropped as incomplete.
fn parse_keyword_blocks(text: &str) -> Vec<Scenario> {
    let mut scenarios = Vec::new();
    let mut block: Vec<String> = Vec::new();
    let mut saw_then = false;

    for raw in text.lines() {
        let line = raw.trim();
        let keyword = step_keyword(line);

        if line.is_empty() || keyword == Some("when") {
            flush_keyword_block(&mut scenarios, &mut block, &mut saw_then);
            if keyword == Some("when") {
                block.push(line.to_string());
            }
            continue;
        }
        if block.is_empty() {
            // Blocks open only on a When line.
            continue;
        }
        match keyword {
            Some("then") => {
                saw_then = true;
                block.push(line.to_string());
            }
            Some("and") | Some("but") => block.push(line.to_string()),
            _ => {}
        }
    }
    flush_keyword_block(&mut scenarios, &mut block, &mut saw_then);
    scenarios
}

fn flush_keyword_block(
    scenarios: &mut Vec<Scenario>,
    block: &mut Vec<String>,
    saw_then: &mut bool,
) {
    let mut steps = std::mem::take(block);
    let complete = std::mem::take(saw_then);
    if !complete {
        return;
    }
    let Some(expected_result) = steps.pop() else {
        return;
    };
    scenarios.push(Scenario {
        name: format!("Scenario {}", scenarios.len() + 1),
        steps,
        expected_result,
    });
}

/// The step keyword `line` opens with, if it opens with one followed by
/// whitespace. The whitespace requirement keeps prose words like
/// "Thenceforth" from reading as steps.
fn step_keyword(line: &str) -> Option<&'static str> {
    for keyword in STEP_KEYWORDS {
        let Some(head) = line.get(..keyword.len()) else {
            continue;
        };
        if head.eq_ignore_ascii_case(keyword)
            && line[keyword.len()..].starts_with(char::is_whitespace)
        {
            return Some(keyword);
        }
    }
    None
}

/// True for steps that open the expected-result clause: `Then ...` or
/// `And then ...`.
fn is_outcome_start(step: &str) -> bool {
    match step_keyword(step) {
        Some("then") => true,
        Some("and") => step_keyword(step["and".len()..].trim_start()) == Some("then"),
        _ => false,
    }
}

/// Split collected steps at the last outcome start: everything from there on
/// is the expected result. A block with no outcome keeps its last step as
/// the expected result, stripped of its keyword.
fn split_expected(steps: Vec<String>) -> (Vec<String>, String) {
    match steps.iter().rposition(|step| is_outcome_start(step)) {
        Some(idx) => {
            let mut steps = steps;
            let expected = steps.split_off(idx);
            (steps, expected.join("\n"))
        }
        None => {
            let expected = steps
                .last()
                .map(|step| strip_keyword(step))
                .unwrap_or_default();
            (steps, expected)
        }
    }
}

fn strip_keyword(step: &str) -> String {
    match step_keyword(step) {
        Some(keyword) => step[keyword.len()..].trim_start().to_string(),
        None => step.to_string(),
    }
}
