use pcs_engine::{InvalidReason, Outcome, ProvenanceEntry, ResolutionVerbose, RuleStatus, Source};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const RED: &str = "\x1b[31m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(source: &str, res: &ResolutionVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    println!("\n{}", palette.bold(palette.paint(format!("⚙  Resolving: {source}"), ansi::CYAN)));

    println!("\n{}", palette.paint("━━━ Rules ━━━", ansi::GRAY));
    print_rules(res, &palette);

    println!("\n{}", palette.paint("━━━ Queries ━━━", ansi::GRAY));
    if res.resolution.queries.is_empty() {
        println!("{}", palette.dim("  None"));
    }
    for query in &res.resolution.queries {
        println!(
            "  {} {} {}",
            palette.paint(format!("[{}]", query.id), ansi::YELLOW),
            palette.paint(query.axis.title(), ansi::BLUE),
            query.message
        );
    }

    println!("\n{}", palette.paint("━━━ Outcome ━━━", ansi::GRAY));
    print_outcome(&res.resolution.outcome, &palette);

    let m = &res.metrics;
    println!("\n{}", palette.paint("━━━ Metrics ━━━", ansi::GRAY));
    println!(
        "  Rules: {}  │  Gated: {}  │  Fired: {}  │  Overrides: {}  │  Queries: {} {}",
        m.rules_considered,
        palette.dim(m.rules_gated.to_string()),
        palette.paint(m.rules_fired.to_string(), ansi::GREEN),
        palette.paint(m.overrides.to_string(), ansi::CYAN),
        palette.paint(m.queries_emitted.to_string(), ansi::YELLOW),
        palette.dim(format!("({} duplicate)", m.queries_deduplicated)),
    );
    println!();
}

fn print_rules(res: &ResolutionVerbose, palette: &ansi::Palette) {
    let fired: Vec<&str> =
        res.trace.iter().filter(|t| t.status == RuleStatus::Fired).map(|t| t.rule.as_str()).collect();
    if fired.is_empty() {
        println!("{}", palette.dim("  No rules fired"));
    }
    for rule in fired {
        println!("  {} {}", palette.paint("✓", ansi::GREEN), palette.paint(rule, ansi::CYAN));
    }

    let gated = res.trace.iter().filter(|t| t.status == RuleStatus::Gated).count();
    let unmatched = res.trace.iter().filter(|t| t.status == RuleStatus::NotMatched).count();
    println!("  {}", palette.dim(format!("{gated} gated by flags, {unmatched} not matched")));
}

fn print_outcome(outcome: &Outcome, palette: &ansi::Palette) {
    match outcome {
        Outcome::Valid { code, provenance } => {
            let status = palette.paint("Valid", ansi::GREEN);
            println!("  {} {}", status, palette.bold(palette.paint(code.as_str(), ansi::GREEN)));
            for (entry, c) in provenance.iter().zip(code.as_str().chars().skip(1)) {
                println!("    {}", fmt_provenance(entry, c, palette));
            }
        }
        Outcome::Incomplete { missing, options, .. } => {
            let names: Vec<&str> = missing.axes().map(|a| a.title()).collect();
            println!("  {} missing {}", palette.paint("Incomplete", ansi::YELLOW), names.join(", "));
            for (axis, values) in options {
                let shown: Vec<&str> = values.iter().take(8).map(String::as_str).collect();
                let more = values.len().saturating_sub(shown.len());
                let suffix = if more > 0 { palette.dim(format!(" ... +{more} more")) } else { String::new() };
                println!(
                    "    {} {}{}",
                    palette.paint(format!("{}:", axis.title()), ansi::BLUE),
                    if shown.is_empty() { palette.dim("no valid values") } else { shown.join(" | ") },
                    suffix
                );
            }
        }
        Outcome::Invalid { axis, reason, attempted } => {
            let reason = match reason {
                InvalidReason::UnknownTerm => "unknown term",
                InvalidReason::NoValidRow => "no valid table row",
                InvalidReason::AmbiguousRow => "ambiguous table row",
            };
            let at = axis.map(|a| format!(" on {}", a.title())).unwrap_or_default();
            println!("  {} {reason}{at}", palette.paint("Invalid", ansi::RED));
            println!("    {} {}", palette.dim("attempted:"), attempted);
        }
    }
}

fn fmt_provenance(entry: &ProvenanceEntry, c: char, palette: &ansi::Palette) -> String {
    let source = match &entry.source {
        Source::Extracted => palette.dim(format!("extracted ({})", entry.origin)),
        Source::User => palette.paint(format!("user ({})", entry.origin), ansi::BLUE),
        Source::Rule { id } => palette.paint(format!("rule {id}"), ansi::CYAN),
    };
    let mut line = format!(
        "{} {:<14} {}  {}",
        palette.paint(c.to_string(), ansi::YELLOW),
        entry.axis.title(),
        entry.value,
        source
    );
    if let Some(prev) = &entry.superseded {
        line.push_str(&palette.dim(format!("  (replaced \"{}\")", prev.value)));
    }
    if let Some(term) = &entry.expanded_from {
        line.push_str(&palette.dim(format!("  (one value of \"{term}\")")));
    }
    if let Some(specific) = &entry.generalized_from {
        line.push_str(&palette.dim(format!("  (generalized from \"{specific}\")")));
    }
    line
}
