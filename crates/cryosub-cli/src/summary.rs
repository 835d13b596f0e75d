use console::Style;
use cryosub_core::pipeline::{RunSummary, SubtractionConfig, VolumeSource};

struct Styles {
    title: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn describe(source: &VolumeSource) -> String {
    match source {
        VolumeSource::Map(p) => format!("{} (map)", p.display()),
        VolumeSource::Fourier(p) => format!("{} (Fourier)", p.display()),
    }
}

pub fn print_run_summary(config: &SubtractionConfig) {
    let s = Styles::new();

    println!();
    println!("  {}", s.title.apply_to("Projection Subtraction"));
    println!("  {}", s.title.apply_to("\u{2550}".repeat(22)));
    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Input"),
        s.path.apply_to(config.input.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(config.output.display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Stacks in"),
        s.path.apply_to(config.dest_dir().display())
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Subtract"),
        s.value.apply_to(describe(&config.submap))
    );
    match config.refmap {
        Some(ref reference) => println!(
            "  {:<14}{} {}",
            s.label.apply_to("Reference"),
            s.value.apply_to(describe(reference)),
            s.method.apply_to("[per-shell scaling]")
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Reference"),
            s.disabled.apply_to("none (unscaled)")
        ),
    }
    println!(
        "  {:<14}{} workers, queue {}",
        s.label.apply_to("Threads"),
        s.value.apply_to(config.workers()),
        s.value.apply_to(config.queue_capacity)
    );
    if let Some(apix) = config.pixel_size {
        println!(
            "  {:<14}{} Å",
            s.label.apply_to("Pixel size"),
            s.value.apply_to(apix)
        );
    }
    println!();
}

pub fn print_run_result(summary: &RunSummary, config: &SubtractionConfig) {
    let s = Styles::new();
    println!(
        "  {} {} particles into {} stacks",
        s.method.apply_to("Subtracted"),
        s.value.apply_to(summary.particles),
        s.value.apply_to(summary.stacks.len())
    );
    for stack in &summary.stacks {
        println!(
            "    {:<6}{}",
            s.value.apply_to(stack.written),
            s.path.apply_to(stack.path.display())
        );
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Metadata"),
        s.path.apply_to(config.output.display())
    );
}
