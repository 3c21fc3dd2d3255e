use console::Style;
use demosaic_core::batch::{BatchConfig, BatchSummary};
use demosaic_core::DenoiseMode;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
    good: Style,
    bad: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
            good: Style::new().green().bold(),
            bad: Style::new().red().bold(),
        }
    }
}

pub fn print_batch_config(config: &BatchConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Demosaic Batch"));
    println!(
        "  {}",
        s.title
            .apply_to("\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}\u{2550}")
    );
    println!();

    println!(
        "  {:<14}{} ({} enabled)",
        s.label.apply_to("Targets"),
        s.value.apply_to(config.targets.len()),
        config.enabled_count()
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Method"),
        s.method.apply_to(config.job.method)
    );
    if config.job.denoise == DenoiseMode::Off {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Denoise"),
            s.disabled.apply_to("off")
        );
    } else {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Denoise"),
            s.method.apply_to(config.job.denoise)
        );
    }
    match &config.job.pattern {
        Some(p) => println!(
            "  {:<14}{}",
            s.label.apply_to("Pattern"),
            s.value.apply_to(p)
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Pattern"),
            s.disabled.apply_to("from metadata")
        ),
    }
    match &config.job.output.directory {
        Some(dir) => println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.path.apply_to(dir.display())
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.disabled.apply_to("next to sources")
        ),
    }
    if config.job.evaluate_noise || config.job.evaluate_signal {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Evaluate"),
            s.value.apply_to(match (config.job.evaluate_noise, config.job.evaluate_signal) {
                (true, true) => "noise + signal",
                (true, false) => "noise",
                _ => "signal",
            })
        );
    }
    println!();
}

pub fn print_batch_result(batch: &BatchSummary) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to("Results"));
    println!(
        "    {:<12}{}",
        s.label.apply_to("Succeeded"),
        s.good.apply_to(batch.succeeded)
    );
    if batch.failed > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Failed"),
            s.bad.apply_to(batch.failed)
        );
    }
    if batch.skipped > 0 {
        println!(
            "    {:<12}{}",
            s.label.apply_to("Skipped"),
            s.disabled.apply_to(batch.skipped)
        );
    }
    println!();

    for outcome in batch.outcomes.iter().flatten() {
        if let Some(output) = &outcome.output {
            println!(
                "    {} {}",
                s.label.apply_to("\u{2713}"),
                s.path.apply_to(output.output_path.display())
            );
            if let Some(stats) = &output.stats {
                for st in stats {
                    if let Some(noise) = &st.noise {
                        println!(
                            "      {:<10}{:.3e}",
                            s.label.apply_to(format!("noise {}", st.channel)),
                            noise.sigma
                        );
                    }
                }
            }
        }
    }
    println!();
}
