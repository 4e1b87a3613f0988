use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eframe::egui::{
    self, Align, Color32, Frame, Layout, Margin, RichText, Rounding, Stroke, Vec2,
};
use log::{debug, error, warn};
use tokio::runtime::{Builder, Runtime};
use tokio::sync::{Mutex, mpsc};

use crate::catalog::{Catalog, CatalogEntry, GameId};
use crate::engine::LauncherEngine;
use crate::engine::state::{LauncherEvent, UserAction};
use crate::pipeline::Stage;
use crate::resolver::InstallationState;
use crate::storage::LocalGameStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    bg: Color32,
    panel: Color32,
    surface: Color32,
    surface_elev: Color32,
    border: Color32,
    border_strong: Color32,
    text_primary: Color32,
    text_muted: Color32,
    text_faint: Color32,
    accent: Color32,
    info: Color32,
    warning: Color32,
    danger: Color32,
    install: Color32,
    update: Color32,
    play: Color32,
}

const DARK: Palette = Palette {
    bg: Color32::from_rgb(13, 17, 26),
    panel: Color32::from_rgb(18, 24, 35),
    surface: Color32::from_rgb(26, 33, 46),
    surface_elev: Color32::from_rgb(32, 41, 56),
    border: Color32::from_rgb(48, 60, 80),
    border_strong: Color32::from_rgb(66, 82, 106),
    text_primary: Color32::from_rgb(230, 236, 245),
    text_muted: Color32::from_rgb(165, 179, 198),
    text_faint: Color32::from_rgb(125, 138, 156),
    accent: Color32::from_rgb(86, 156, 214),
    info: Color32::from_rgb(122, 186, 255),
    warning: Color32::from_rgb(246, 195, 111),
    danger: Color32::from_rgb(239, 117, 117),
    // Action colors carried over from the classic launcher buttons.
    install: Color32::from_rgb(0, 143, 159),
    update: Color32::from_rgb(204, 153, 0),
    play: Color32::from_rgb(0, 168, 89),
};

fn apply_theme(ctx: &egui::Context, colors: &Palette) {
    let mut visuals = egui::Visuals::dark();
    visuals.panel_fill = colors.bg;
    visuals.window_fill = colors.panel;
    visuals.override_text_color = Some(colors.text_primary);
    visuals.hyperlink_color = colors.info;
    visuals.widgets.noninteractive.bg_fill = colors.surface;
    visuals.widgets.inactive.bg_fill = colors.surface_elev;
    visuals.widgets.hovered.bg_fill = colors.accent;
    visuals.widgets.active.bg_fill = colors.accent;
    visuals.widgets.noninteractive.bg_stroke = Stroke::new(1.0, colors.border);
    visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, colors.border_strong);
    visuals.selection.bg_fill = colors.accent;
    visuals.window_corner_radius = Rounding::same(12);
    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();
    style.spacing.item_spacing = Vec2::new(10.0, 10.0);
    style.spacing.button_padding = Vec2::new(14.0, 8.0);
    ctx.set_style(style);
}

fn section_frame(colors: &Palette) -> Frame {
    Frame::none()
        .fill(colors.surface)
        .stroke(Stroke::new(1.0, colors.border))
        .rounding(Rounding::same(12))
        .inner_margin(Margin::same(12))
}

fn action_button<'a>(label: &'a str, fill: Color32, colors: &'a Palette) -> egui::Button<'a> {
    egui::Button::new(RichText::new(label).color(colors.text_primary).strong())
        .fill(fill)
        .stroke(Stroke::new(1.0, colors.border_strong))
        .min_size(Vec2::new(130.0, 36.0))
}

fn build_runtime() -> Arc<Runtime> {
    match Runtime::new() {
        Ok(rt) => Arc::new(rt),
        Err(err) => {
            warn!(
                "ui: failed to create multithreaded runtime ({}); trying single-threaded runtime",
                err
            );
            match Builder::new_current_thread().enable_all().build() {
                Ok(rt) => Arc::new(rt),
                Err(fallback_err) => {
                    error!(
                        "ui: failed to create any Tokio runtime ({}); terminating launcher",
                        fallback_err
                    );
                    std::process::exit(1);
                }
            }
        }
    }
}

pub struct LauncherApp {
    runtime: Arc<Runtime>,
    engine: Arc<Mutex<LauncherEngine>>,
    store: LocalGameStore,
    cancel_flag: Arc<AtomicBool>,
    events_rx: mpsc::UnboundedReceiver<LauncherEvent>,
    events_tx: mpsc::UnboundedSender<LauncherEvent>,
    catalog: Catalog,
    catalog_error: Option<String>,
    refreshing: bool,
    states: HashMap<GameId, (InstallationState, bool)>,
    busy: HashSet<GameId>,
    progress: HashMap<GameId, (Stage, f32, String)>,
    errors: HashMap<GameId, String>,
    search: String,
    selected: Option<GameId>,
    confirm_uninstall: Option<GameId>,
    feed_view: Option<(GameId, String)>,
    feed_loading: Option<GameId>,
}

impl LauncherApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        let runtime = build_runtime();
        let cancel_flag = Arc::new(AtomicBool::new(false));
        let engine = Arc::new(Mutex::new(LauncherEngine::new(cancel_flag.clone())));
        let (tx, rx) = mpsc::unbounded_channel();

        let mut app = Self {
            runtime,
            engine,
            store: LocalGameStore::new(),
            cancel_flag,
            events_rx: rx,
            events_tx: tx,
            catalog: Catalog::default(),
            catalog_error: None,
            refreshing: false,
            states: HashMap::new(),
            busy: HashSet::new(),
            progress: HashMap::new(),
            errors: HashMap::new(),
            search: String::new(),
            selected: None,
            confirm_uninstall: None,
            feed_view: None,
            feed_loading: None,
        };
        app.refreshing = true;
        app.trigger_action(UserAction::RefreshCatalog);
        app
    }

    fn trigger_action(&self, action: UserAction) {
        // Raise the cancel flag synchronously; the queued action would
        // otherwise wait behind the very download it is meant to stop.
        if matches!(action, UserAction::CancelOperation { .. }) {
            self.cancel_flag.store(true, Ordering::SeqCst);
        }
        let engine = self.engine.clone();
        let tx = self.events_tx.clone();
        let rt = self.runtime.clone();
        rt.spawn(async move {
            let mut locked = engine.lock().await;
            locked.handle_action(action, &tx).await;
        });
    }

    // Warm the on-disk icon cache for every entry; the list itself renders
    // without images, so failures only get logged.
    fn prefetch_icons(&self, catalog: Catalog) {
        let engine = self.engine.clone();
        let rt = self.runtime.clone();
        rt.spawn(async move {
            let fetcher = {
                let locked = engine.lock().await;
                locked.fetcher()
            };
            for entry in &catalog.games {
                match fetcher.ensure_icon(entry).await {
                    Ok(path) => debug!("icon for {} at {}", entry.id, path.display()),
                    Err(err) => debug!("icon fetch for {} skipped: {err}", entry.id),
                }
            }
        });
    }

    fn sync_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                LauncherEvent::CatalogLoaded(catalog) => {
                    self.refreshing = false;
                    self.catalog_error = None;
                    self.prefetch_icons(catalog.clone());
                    if self.selected.is_none() {
                        self.selected = catalog.games.first().map(|entry| entry.id.clone());
                    }
                    self.catalog = catalog;
                }
                LauncherEvent::CatalogFailed(err) => {
                    self.refreshing = false;
                    self.catalog = Catalog::default();
                    self.catalog_error = Some(err.to_string());
                }
                LauncherEvent::StateResolved { id, state, available } => {
                    self.states.insert(id, (state, available));
                }
                LauncherEvent::Progress {
                    id,
                    stage,
                    percent,
                    speed,
                } => {
                    self.progress.insert(id, (stage, percent, speed));
                }
                LauncherEvent::OperationFailed { id, error } => {
                    self.busy.remove(&id);
                    self.progress.remove(&id);
                    if self.feed_loading.as_ref() == Some(&id) {
                        self.feed_loading = None;
                    }
                    self.errors
                        .insert(id, format!("{}: {error}", error.kind()));
                }
                LauncherEvent::OperationCompleted { id } => {
                    self.busy.remove(&id);
                    self.progress.remove(&id);
                    self.errors.remove(&id);
                }
                LauncherEvent::FeedLoaded { id, content } => {
                    self.feed_loading = None;
                    self.feed_view = Some((id, content));
                }
            }
        }
    }

    fn selected_entry(&self) -> Option<&CatalogEntry> {
        self.selected.as_ref().and_then(|id| self.catalog.find(id))
    }

    fn matches_search(&self, entry: &CatalogEntry) -> bool {
        let needle = self.search.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        entry.name.to_lowercase().contains(&needle)
            || entry.developer.to_lowercase().contains(&needle)
    }

    fn request_play(&mut self, id: GameId) {
        self.errors.remove(&id);
        self.busy.insert(id.clone());
        self.trigger_action(UserAction::Play { id });
    }

    fn request_uninstall(&mut self, id: GameId) {
        self.errors.remove(&id);
        self.trigger_action(UserAction::Uninstall { id });
    }

    fn render_game_list(&mut self, ui: &mut egui::Ui, colors: &Palette) {
        ui.add(
            egui::TextEdit::singleline(&mut self.search)
                .hint_text("Search by game or developer")
                .desired_width(f32::INFINITY),
        );
        ui.add_space(4.0);

        egui::ScrollArea::vertical().show(ui, |ui| {
            let visible: Vec<(GameId, String, String)> = self
                .catalog
                .games
                .iter()
                .filter(|entry| self.matches_search(entry))
                .map(|entry| {
                    (
                        entry.id.clone(),
                        entry.name.clone(),
                        entry.developer.clone(),
                    )
                })
                .collect();

            if visible.is_empty() {
                let message = if self.catalog.is_empty() {
                    "No games loaded."
                } else {
                    "No games match the search."
                };
                ui.label(RichText::new(message).color(colors.text_faint));
                return;
            }

            for (id, name, developer) in visible {
                let is_selected = self.selected.as_ref() == Some(&id);
                if ui
                    .selectable_label(is_selected, format!("{name}\n    {developer}"))
                    .clicked()
                {
                    self.selected = Some(id);
                }
            }
        });
    }

    fn render_details(&mut self, ui: &mut egui::Ui, colors: &Palette) {
        let Some(entry) = self.selected_entry().cloned() else {
            ui.centered_and_justified(|ui| {
                ui.label(RichText::new("Select a game from the list.").color(colors.text_faint));
            });
            return;
        };

        section_frame(colors).show(ui, |ui| {
            ui.horizontal(|ui| {
                ui.heading(RichText::new(&entry.name).color(colors.accent));
                ui.allocate_ui_with_layout(
                    ui.available_size_before_wrap(),
                    Layout::right_to_left(Align::Center),
                    |ui| self.render_options_row(ui, colors, &entry),
                );
            });
            if !entry.dev_status.is_empty() {
                ui.label(
                    RichText::new(format!("Status: {}", entry.dev_status))
                        .color(colors.text_muted)
                        .small(),
                );
            }
            ui.label(RichText::new(&entry.developer).color(colors.text_muted));
            ui.separator();
            ui.label(&entry.description);
        });

        ui.add_space(8.0);
        section_frame(colors).show(ui, |ui| {
            self.render_action_row(ui, colors, &entry);
        });
    }

    fn render_options_row(&mut self, ui: &mut egui::Ui, colors: &Palette, entry: &CatalogEntry) {
        let installed = self.store.is_installed(&entry.id);
        let small = |label: &str| {
            egui::Button::new(RichText::new(label).small())
                .fill(colors.surface_elev)
                .stroke(Stroke::new(1.0, colors.border))
        };

        if entry.rss_feed.is_some() && ui.add(small("Updates")).clicked() {
            self.feed_loading = Some(entry.id.clone());
            self.trigger_action(UserAction::LoadUpdatesFeed {
                id: entry.id.clone(),
            });
        }
        if let Some(website) = &entry.website {
            if ui.add(small("Website")).clicked() {
                if let Err(err) = open::that(website) {
                    warn!("unable to open {website}: {err}");
                }
            }
        }
        if ui.add_enabled(installed, small("Game folder")).clicked() {
            let root = self.store.install_root(&entry.id);
            if let Err(err) = open::that(&root) {
                warn!("unable to open {}: {err}", root.display());
            }
        }
        if ui.add_enabled(installed, small("Uninstall")).clicked() {
            self.confirm_uninstall = Some(entry.id.clone());
        }
    }

    fn render_action_row(&mut self, ui: &mut egui::Ui, colors: &Palette, entry: &CatalogEntry) {
        let (state, available) = self
            .states
            .get(&entry.id)
            .copied()
            .unwrap_or((InstallationState::NotInstalled, false));
        let is_busy = self.busy.contains(&entry.id);

        ui.horizontal(|ui| {
            if !available {
                ui.add_enabled(
                    false,
                    action_button("Not available", colors.surface_elev, colors),
                );
                ui.label(
                    RichText::new("This game has no build for your platform.")
                        .color(colors.text_faint),
                );
            } else {
                let (label, fill) = match state {
                    InstallationState::NotInstalled => ("Download", colors.install),
                    InstallationState::UpdateAvailable => ("Update", colors.update),
                    InstallationState::UpToDate => ("Play", colors.play),
                };
                if ui
                    .add_enabled(!is_busy, action_button(label, fill, colors))
                    .clicked()
                {
                    self.request_play(entry.id.clone());
                }
                if is_busy {
                    let cancel_btn = egui::Button::new("Cancel")
                        .fill(colors.surface_elev)
                        .stroke(Stroke::new(1.0, colors.danger));
                    if ui.add(cancel_btn).clicked() {
                        self.trigger_action(UserAction::CancelOperation {
                            id: entry.id.clone(),
                        });
                    }
                }
            }
            if self.feed_loading.as_ref() == Some(&entry.id) {
                ui.add(egui::Spinner::new());
            }
        });

        if let Some((stage, percent, speed)) = self.progress.get(&entry.id) {
            ui.add_space(6.0);
            let stage_label = match stage {
                Stage::Download => "Downloading",
                Stage::Extract => "Extracting",
                Stage::Stamp => "Finalizing",
            };
            let text = if speed.is_empty() {
                format!("{stage_label}… {percent:.0}%")
            } else {
                format!("{stage_label}… {percent:.0}% ({speed})")
            };
            ui.add(
                egui::ProgressBar::new(percent / 100.0)
                    .fill(colors.accent)
                    .rounding(Rounding::same(8))
                    .desired_height(20.0)
                    .text(text),
            );
        }

        if let Some(message) = self.errors.get(&entry.id) {
            ui.add_space(6.0);
            ui.colored_label(colors.danger, message);
        }
    }

    fn render_uninstall_confirm(&mut self, ctx: &egui::Context, colors: &Palette) {
        let Some(id) = self.confirm_uninstall.clone() else {
            return;
        };
        let name = self
            .catalog
            .find(&id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| id.to_string());

        egui::Window::new("Confirm uninstall")
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label(format!(
                    "Remove '{name}' and delete its folder '{}'?",
                    self.store.install_root(&id).display()
                ));
                ui.add_space(8.0);
                ui.horizontal(|ui| {
                    let yes = egui::Button::new(RichText::new("Uninstall").strong())
                        .fill(colors.danger);
                    if ui.add(yes).clicked() {
                        self.request_uninstall(id.clone());
                        self.confirm_uninstall = None;
                    }
                    if ui.button("Keep installed").clicked() {
                        self.confirm_uninstall = None;
                    }
                });
            });
    }

    fn render_feed_view(&mut self, ctx: &egui::Context, colors: &Palette) {
        let Some((id, content)) = self.feed_view.clone() else {
            return;
        };
        let name = self
            .catalog
            .find(&id)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| id.to_string());

        let mut open_flag = true;
        egui::Window::new(format!("{name}: updates"))
            .open(&mut open_flag)
            .default_size(Vec2::new(560.0, 420.0))
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| {
                    ui.label(RichText::new(content).color(colors.text_muted).monospace());
                });
            });
        if !open_flag {
            self.feed_view = None;
        }
    }
}

impl eframe::App for LauncherApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.sync_events();
        let colors = DARK;
        apply_theme(ctx, &colors);

        // Background tasks report through channels; keep polling while any
        // operation is in flight.
        if !self.busy.is_empty() || self.refreshing || self.feed_loading.is_some() {
            ctx.request_repaint_after(Duration::from_millis(200));
        }

        egui::TopBottomPanel::top("top_bar")
            .frame(
                Frame::none()
                    .fill(colors.panel)
                    .stroke(Stroke::new(1.0, colors.border))
                    .inner_margin(Margin::symmetric(16, 10)),
            )
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading(RichText::new("Andus Launcher").color(colors.accent));
                    ui.label(
                        RichText::new(format!("v{}", env!("CARGO_PKG_VERSION")))
                            .color(colors.text_faint)
                            .small(),
                    );
                    ui.allocate_ui_with_layout(
                        ui.available_size_before_wrap(),
                        Layout::right_to_left(Align::Center),
                        |ui| {
                            let refresh = egui::Button::new("Refresh catalog")
                                .fill(colors.surface_elev)
                                .stroke(Stroke::new(1.0, colors.border_strong));
                            if ui.add_enabled(!self.refreshing, refresh).clicked() {
                                self.refreshing = true;
                                self.trigger_action(UserAction::RefreshCatalog);
                            }
                            if self.refreshing {
                                ui.add(egui::Spinner::new());
                            }
                        },
                    );
                });
                if let Some(err) = &self.catalog_error {
                    ui.colored_label(
                        colors.warning,
                        format!("Catalog could not be loaded: {err}"),
                    );
                }
            });

        egui::SidePanel::left("game_list")
            .frame(
                Frame::none()
                    .fill(colors.panel)
                    .inner_margin(Margin::same(12)),
            )
            .default_width(300.0)
            .show(ctx, |ui| {
                self.render_game_list(ui, &colors);
            });

        egui::CentralPanel::default()
            .frame(
                Frame::none()
                    .fill(colors.bg)
                    .inner_margin(Margin::same(16)),
            )
            .show(ctx, |ui| {
                self.render_details(ui, &colors);
            });

        self.render_uninstall_confirm(ctx, &colors);
        self.render_feed_view(ctx, &colors);
    }
}
