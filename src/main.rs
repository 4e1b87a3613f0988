use clap::Parser;
use env_logger::Env;

mod archive;
mod catalog;
mod engine;
mod env;
mod error;
mod networking;
mod pipeline;
mod process;
mod resolver;
mod storage;
mod ui;
mod util;
mod version;

#[derive(Parser, Debug)]
#[command(
    name = "Andus Launcher",
    author,
    version,
    about = "Desktop catalog launcher for downloading, updating and playing indie games"
)]
struct Cli {
    /// Print launcher version and exit without starting the UI.
    #[arg(long)]
    version_only: bool,
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.version_only {
        println!("Andus Launcher {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default()
            .with_icon(default_icon())
            .with_inner_size(eframe::egui::vec2(1100.0, 700.0)),
        ..Default::default()
    };
    eframe::run_native(
        "Andus Launcher",
        options,
        Box::new(|cc| Ok(Box::new(ui::LauncherApp::new(cc)))),
    )
}

fn default_icon() -> eframe::egui::IconData {
    // Simple 2x2 icon: dark background with a blue accent.
    let rgba: Vec<u8> = vec![
        13, 17, 26, 255, 86, 156, 214, 255, //
        13, 17, 26, 255, 60, 120, 180, 255,
    ];
    eframe::egui::IconData {
        rgba,
        width: 2,
        height: 2,
    }
}
