//! Command-line demo: trains a small classifier on a toy dataset, saves it,
//! and reloads it from the store.
//!
//!   cargo run -- [path/to/config.json]

use std::path::PathBuf;
use std::process::ExitCode;

use tracing::error;

use ferrite_workbench::data::builtin_blobs;
use ferrite_workbench::{
    logging, AppConfig, Hyperparameters, InMemoryDataset, LayerDescriptor, LayerKind, LossType,
    ModelArchitecture, ModelEntity, OptimizerType, Prediction, TaskKind, Tensor, TrainingEngine,
    TrainingEvent, Workbench,
};

const DEMO_USER: &str = "demo";
const DEMO_MODEL: &str = "blobs-mlp";

fn main() -> ExitCode {
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config.json"));
    let config = match AppConfig::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let app = Workbench::init(config)?;
    let user_id = match app.store.find_user(DEMO_USER)? {
        Some(id) => id,
        None => app.store.register_user(DEMO_USER)?,
    };

    let architecture = ModelArchitecture::new(vec![
        LayerDescriptor::new(LayerKind::Linear).with("in_features", 2).with("out_features", 8),
        LayerDescriptor::new(LayerKind::Relu),
        LayerDescriptor::new(LayerKind::Linear).with("in_features", 8).with("out_features", 2),
    ]);
    println!("architecture: {}", architecture.to_json()?);
    let model = ModelEntity::build(&architecture)?;

    let (features, classes) = builtin_blobs(200);
    let dataset = InMemoryDataset::from_rows(&features, &classes, 16)?.with_shuffle(true);
    let (train, validation) = dataset.split(0.2);
    let hyper = Hyperparameters::new(20, 0.01, OptimizerType::Adam, LossType::CrossEntropy);

    let mut engine = TrainingEngine::new();
    let events = engine.start(model, hyper, Box::new(train), Box::new(validation))?;

    let mut trained = None;
    for event in events {
        match event {
            TrainingEvent::Progress { epoch, total_epochs, progress_percent, history } => {
                let last = history.len() - 1;
                println!(
                    "[{:>3}%] epoch {:>2}/{}  loss {:.4}  val_loss {:.4}  acc {:>5.1}%  val_acc {:>5.1}%",
                    progress_percent, epoch, total_epochs,
                    history.train_loss[last], history.val_loss[last],
                    history.train_accuracy[last], history.val_accuracy[last],
                );
            }
            TrainingEvent::Completed { model, .. } => trained = Some(model),
            TrainingEvent::Cancelled { completed_epochs, model, .. } => {
                println!("cancelled after {} epochs", completed_epochs);
                trained = Some(model);
            }
            TrainingEvent::Failed { reason, .. } => return Err(reason.into()),
        }
    }
    engine.join();
    let trained = trained.ok_or("training ended without returning the model")?;

    let id = app.store.save(&trained, DEMO_MODEL, Some(user_id))?;
    println!("saved model {} as '{}' for user {}", id, DEMO_MODEL, user_id);

    for summary in app.store.list(Some(user_id))? {
        println!("  #{:<4} {:<20} created_at={}", summary.id, summary.name, summary.created_at);
    }

    let mut reloaded = app.store.load(id, Some(user_id))?;
    app.store.load_weights(&mut reloaded, user_id, DEMO_MODEL)?;
    let queries = Tensor::from_rows(&[vec![0.3, 0.3], vec![0.7, 0.7]])?;
    if let Prediction::Classes(classes) = reloaded.predict(&queries, TaskKind::Classification)? {
        println!("predictions for (0.3, 0.3) and (0.7, 0.7): {:?}", classes);
    }

    app.shutdown();
    Ok(())
}
