// Image Optimizer desktop front-end
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use iced::font::{Family, Weight};
use iced::widget::{button, checkbox, column, container, progress_bar, row, scrollable, slider, text, Space};
use iced::{executor, subscription, Application, Command, Element, Font, Length, Settings, Subscription, Theme};
use image_optimizer::batch::{self, BatchEvent, BatchJob, BatchReport, CancelFlag, ProcessResult};
use image_optimizer::formats::IMAGE_EXTENSIONS;
use image_optimizer::settings::Settings as StoredSettings;
use image_optimizer::{logging, OptimizeOptions, Quality};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{info, warn};

const HEADING_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Bold,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

const BODY_FONT: Font = Font {
    family: Family::SansSerif,
    weight: Weight::Normal,
    stretch: iced::font::Stretch::Normal,
    monospaced: false,
};

/// Worker events buffered before the worker blocks on the UI.
const EVENT_BUFFER: usize = 64;

pub fn main() -> iced::Result {
    logging::init();
    info!("=== Application Starting ===");

    ImageOptimizer::run(Settings {
        window: iced::window::Settings {
            size: (560, 700),
            min_size: Some((500, 600)),
            resizable: true,
            decorations: true,
            ..Default::default()
        },
        default_font: BODY_FONT,
        default_text_size: 14.0,
        ..Default::default()
    })
}

struct ActiveRun {
    id: u64,
    job: BatchJob,
    cancel: CancelFlag,
}

#[derive(Default)]
struct ImageOptimizer {
    input_path: Option<PathBuf>,
    output_path: Option<PathBuf>,
    quality: u8,
    optimize_palette: bool,
    force_jpeg: bool,
    run: Option<ActiveRun>,
    runs_started: u64,
    progress: f32,
    status_message: String,
    current_file: String,
    results: Vec<ProcessResult>,
}

#[derive(Debug, Clone)]
enum Message {
    SelectFile,
    SelectFolder,
    InputSelected(Option<PathBuf>),
    SelectOutput,
    OutputSelected(Option<PathBuf>),
    QualityChanged(u8),
    OptimizePaletteToggled(bool),
    ForceJpegToggled(bool),
    Start,
    Cancel,
    WorkerStarted,
    Batch(BatchEvent),
    OpenOutputFolder,
    ClearResults,
}

impl Application for ImageOptimizer {
    type Message = Message;
    type Theme = Theme;
    type Executor = executor::Default;
    type Flags = ();

    fn new(_flags: ()) -> (Self, Command<Message>) {
        let stored = StoredSettings::load_or_default().unwrap_or_else(|e| {
            warn!("Using default settings: {}", e);
            StoredSettings::default()
        });
        let options = stored.options();

        let app = Self {
            input_path: stored.last_input,
            output_path: stored.last_output,
            quality: options.quality.get(),
            optimize_palette: options.optimize_palette,
            force_jpeg: options.force_jpeg,
            ..Self::default()
        };
        (app, Command::none())
    }

    fn title(&self) -> String {
        String::from("Image Optimizer")
    }

    fn update(&mut self, message: Message) -> Command<Message> {
        match message {
            Message::SelectFile => {
                return Command::perform(select_file(), Message::InputSelected);
            }
            Message::SelectFolder => {
                return Command::perform(select_folder(), Message::InputSelected);
            }
            Message::SelectOutput => {
                return Command::perform(select_folder(), Message::OutputSelected);
            }
            Message::InputSelected(path) => {
                if path.is_some() {
                    self.input_path = path;
                }
            }
            Message::OutputSelected(path) => {
                if path.is_some() {
                    self.output_path = path;
                }
            }
            Message::QualityChanged(quality) => {
                self.quality = quality;
            }
            Message::OptimizePaletteToggled(value) => {
                self.optimize_palette = value;
            }
            Message::ForceJpegToggled(value) => {
                self.force_jpeg = value;
            }
            Message::Start => self.start(),
            Message::Cancel => {
                if let Some(run) = &self.run {
                    run.cancel.cancel();
                    self.status_message = String::from("Cancelling...");
                }
            }
            Message::WorkerStarted => {
                self.status_message = String::from("Scanning...");
            }
            Message::Batch(BatchEvent::Progress(progress)) => {
                self.progress = (progress.done as f32 / progress.total.max(1) as f32).min(1.0);
                self.status_message = format!(
                    "Progress: {}% ({}/{})",
                    progress.percentage(),
                    progress.done,
                    progress.total
                );
                self.current_file = file_name(&progress.current);
            }
            Message::Batch(BatchEvent::Finished(report)) => self.finish(report),
            Message::Batch(BatchEvent::Failed(error)) => {
                self.run = None;
                self.current_file.clear();
                self.status_message = format!("Error: {}", error);
            }
            Message::OpenOutputFolder => {
                if let Some(path) = &self.output_path {
                    if let Err(e) = open::that(path) {
                        warn!("Failed to open {}: {}", path.display(), e);
                    }
                }
            }
            Message::ClearResults => {
                self.results.clear();
                self.progress = 0.0;
                self.status_message.clear();
                self.current_file.clear();
            }
        }
        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        match &self.run {
            Some(run) => worker_subscription(run.id, run.job.clone(), run.cancel.clone()),
            None => Subscription::none(),
        }
    }

    fn view(&self) -> Element<Message> {
        let is_running = self.run.is_some();

        let title = text("Image Optimizer").size(22).font(HEADING_FONT);

        let start_button = if is_running {
            button("Optimizing...").padding([12, 16]).width(Length::Fill)
        } else {
            button("Start Optimization")
                .on_press(Message::Start)
                .padding([12, 16])
                .width(Length::Fill)
        };
        let start_section = column![
            start_button,
            checkbox("Always save as JPG", self.force_jpeg, Message::ForceJpegToggled)
                .size(13)
                .spacing(8),
        ]
        .spacing(8);

        let input_section = column![
            text("File / Folder").size(16).font(HEADING_FONT),
            row![
                button("File").on_press(Message::SelectFile).padding([6, 12]),
                button("Folder").on_press(Message::SelectFolder).padding([6, 12]),
            ]
            .spacing(8),
            text(describe_path(self.input_path.as_deref(), "No input selected"))
                .size(12)
                .font(BODY_FONT),
        ]
        .spacing(8);

        let output_section = column![
            text("Save to folder").size(16).font(HEADING_FONT),
            button("Choose").on_press(Message::SelectOutput).padding([6, 12]),
            text(describe_path(self.output_path.as_deref(), "No output folder selected"))
                .size(12)
                .font(BODY_FONT),
        ]
        .spacing(8);

        let options_section = column![
            text("Options").size(16).font(HEADING_FONT),
            row![
                text("Quality:").size(13).font(BODY_FONT).width(80),
                slider(Quality::MIN..=Quality::MAX, self.quality, Message::QualityChanged)
                    .width(Length::Fill),
                text(format!("{}", self.quality)).size(13).font(BODY_FONT).width(40),
            ]
            .spacing(8),
            checkbox("Optimize PNG palette", self.optimize_palette, Message::OptimizePaletteToggled)
                .size(13)
                .spacing(8),
        ]
        .spacing(8);

        let progress_section = if is_running || self.progress > 0.0 || !self.status_message.is_empty() {
            let cancel_button = if is_running {
                button("Cancel").on_press(Message::Cancel).padding([6, 12])
            } else {
                button("Cancel").padding([6, 12])
            };
            column![
                progress_bar(0.0..=1.0, self.progress).height(Length::Fixed(6.0)),
                text(&self.status_message).size(12).font(BODY_FONT),
                text(&self.current_file).size(12).font(BODY_FONT),
                cancel_button,
            ]
            .spacing(4)
        } else {
            column![]
        };

        let results_section = if !self.results.is_empty() {
            let results_list: Vec<Element<Message>> = self
                .results
                .iter()
                .map(|result| {
                    let status = if result.success { "[OK]" } else { "[FAIL]" };

                    row![
                        text(status)
                            .size(12)
                            .font(if result.success { BODY_FONT } else { HEADING_FONT })
                            .width(40),
                        text(result.filename()).size(12).font(BODY_FONT).width(Length::Fill),
                        if result.success {
                            text(format!(
                                "{} → {} KB ({})",
                                result.original_size / 1024,
                                result.new_size / 1024,
                                result.algorithm_used.map_or("", |a| a.description())
                            ))
                            .size(12)
                            .font(BODY_FONT)
                        } else {
                            text(&result.message).size(12).font(BODY_FONT)
                        }
                    ]
                    .spacing(8)
                    .into()
                })
                .collect();

            column![
                text("Results").size(16).font(HEADING_FONT),
                container(scrollable(column(results_list).spacing(3)).height(Length::Fixed(120.0)))
                    .style(iced::theme::Container::Box)
                    .padding(8),
                row![
                    button("Open Output").on_press(Message::OpenOutputFolder).padding([6, 12]),
                    button("Clear").on_press(Message::ClearResults).padding([6, 12]),
                ]
                .spacing(8)
            ]
            .spacing(8)
        } else {
            column![]
        };

        let content = column![
            title,
            Space::with_height(12),
            start_section,
            Space::with_height(12),
            input_section,
            Space::with_height(12),
            output_section,
            Space::with_height(12),
            options_section,
            Space::with_height(12),
            progress_section,
            Space::with_height(12),
            results_section,
        ]
        .padding(16);

        container(scrollable(content))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

impl ImageOptimizer {
    fn options(&self) -> OptimizeOptions {
        OptimizeOptions {
            quality: Quality::clamped(self.quality),
            optimize_palette: self.optimize_palette,
            force_jpeg: self.force_jpeg,
        }
    }

    fn start(&mut self) {
        if self.run.is_some() {
            return;
        }
        let Some(input) = self.input_path.clone() else {
            self.status_message = String::from("Error: Choose input first");
            return;
        };
        let Some(output) = self.output_path.clone() else {
            self.status_message = String::from("Error: Choose output folder");
            return;
        };

        self.save_settings();

        let job = BatchJob::new(input, output, self.options());
        info!("Starting run for {}", job.input.display());
        self.runs_started += 1;
        self.run = Some(ActiveRun {
            id: self.runs_started,
            job,
            cancel: CancelFlag::new(),
        });
        self.progress = 0.0;
        self.results.clear();
        self.current_file.clear();
        self.status_message = String::from("Starting...");
    }

    fn finish(&mut self, report: BatchReport) {
        self.run = None;
        self.current_file.clear();
        let failed = report.processed() - report.succeeded();
        self.status_message = if report.cancelled {
            format!(
                "Cancelled after {} of {} images ({} failed)",
                report.processed(),
                report.total,
                failed
            )
        } else {
            self.progress = 1.0;
            format!(
                "Optimization completed: {} optimized, {} failed, {} KB saved",
                report.succeeded(),
                failed,
                report.bytes_saved() / 1024
            )
        };
        self.results = report.results;
    }

    fn save_settings(&self) {
        let options = self.options();
        let stored = StoredSettings {
            quality: options.quality.get(),
            optimize_palette: options.optimize_palette,
            force_jpeg: options.force_jpeg,
            last_input: self.input_path.clone(),
            last_output: self.output_path.clone(),
        };
        if let Err(e) = stored.save() {
            warn!("Failed to save settings: {}", e);
        }
    }
}

enum WorkerState {
    Starting { job: BatchJob, cancel: CancelFlag },
    Running(mpsc::Receiver<BatchEvent>),
    Done,
}

/// Spawns the batch worker on first poll and forwards its events until the
/// terminal one arrives.
fn worker_subscription(id: u64, job: BatchJob, cancel: CancelFlag) -> Subscription<Message> {
    subscription::unfold(id, WorkerState::Starting { job, cancel }, |state| async move {
        match state {
            WorkerState::Starting { job, cancel } => {
                let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
                match batch::spawn(job, cancel, sender) {
                    Ok(_) => (Message::WorkerStarted, WorkerState::Running(receiver)),
                    Err(e) => (
                        Message::Batch(BatchEvent::Failed(format!("Failed to start worker: {}", e))),
                        WorkerState::Done,
                    ),
                }
            }
            WorkerState::Running(mut receiver) => match receiver.recv().await {
                Some(event @ (BatchEvent::Finished(_) | BatchEvent::Failed(_))) => {
                    (Message::Batch(event), WorkerState::Done)
                }
                Some(event) => (Message::Batch(event), WorkerState::Running(receiver)),
                None => (
                    Message::Batch(BatchEvent::Failed(String::from("Worker stopped unexpectedly"))),
                    WorkerState::Done,
                ),
            },
            WorkerState::Done => iced::futures::future::pending().await,
        }
    })
}

// Helper functions
async fn select_file() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .add_filter("Images", &IMAGE_EXTENSIONS)
        .pick_file()
        .await
        .map(|handle| handle.path().to_path_buf())
}

async fn select_folder() -> Option<PathBuf> {
    rfd::AsyncFileDialog::new()
        .pick_folder()
        .await
        .map(|handle| handle.path().to_path_buf())
}

fn describe_path(path: Option<&Path>, placeholder: &str) -> String {
    match path {
        Some(path) => {
            let display_path = path.display().to_string();
            let chars: Vec<char> = display_path.chars().collect();
            if chars.len() > 60 {
                let tail: String = chars[chars.len() - 57..].iter().collect();
                format!("...{}", tail)
            } else {
                display_path
            }
        }
        None => placeholder.to_string(),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}
