use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::debug;

use crate::data::source::{Batch, BatchSource};
use crate::error::{ShapeError, TrainingError};
use crate::loss::loss_type::LossType;
use crate::math::tensor::{argmax, Tensor};
use crate::network::model::ModelEntity;
use crate::optim::Optimizer;
use crate::train::epoch_stats::{EpochStats, PassTotals};
use crate::train::history::TrainingHistory;
use crate::train::hyperparams::Hyperparameters;

/// How a loop that did not fail came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed,
    Cancelled { completed_epochs: usize },
}

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `model` for `hyper.epochs` epochs.
///
/// Every epoch is a full training pass (one optimizer step per batch)
/// followed by a full validation pass without parameter updates. After each
/// epoch the history gains one entry per metric and `on_epoch` is called;
/// returning `false` from it cancels the run.
///
/// `stop` is only polled between epochs, so an epoch that has started
/// always finishes.
pub fn train_loop<F>(
    model: &mut ModelEntity,
    hyper: &Hyperparameters,
    train: &mut dyn BatchSource,
    validation: &mut dyn BatchSource,
    stop: &AtomicBool,
    history: &mut TrainingHistory,
    mut on_epoch: F,
) -> Result<LoopOutcome, TrainingError>
where
    F: FnMut(&EpochStats, &TrainingHistory) -> bool,
{
    if hyper.epochs == 0 {
        return Err(TrainingError::NoEpochs);
    }
    let mut optimizer = hyper.optimizer.build(hyper.learning_rate);

    for epoch in 1..=hyper.epochs {
        if stop.load(Ordering::Acquire) {
            return Ok(LoopOutcome::Cancelled { completed_epochs: epoch - 1 });
        }

        let t_start = Instant::now();
        let train_totals = train_pass(model, optimizer.as_mut(), hyper.loss, train, epoch)?;
        if train_totals.batches == 0 {
            return Err(TrainingError::EmptyTrainingSource);
        }
        let val_totals = eval_pass(model, hyper.loss, validation, epoch)?;

        let stats = EpochStats {
            epoch,
            train_loss: train_totals.mean_loss(),
            val_loss: val_totals.mean_loss(),
            train_accuracy: train_totals.accuracy(),
            val_accuracy: val_totals.accuracy(),
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };
        debug!(
            epoch,
            train_loss = stats.train_loss,
            val_loss = stats.val_loss,
            train_accuracy = stats.train_accuracy,
            val_accuracy = stats.val_accuracy,
            elapsed_ms = stats.elapsed_ms,
            "epoch finished"
        );
        history.push(&stats);

        if !on_epoch(&stats, history) {
            return Ok(LoopOutcome::Cancelled { completed_epochs: epoch });
        }
    }
    Ok(LoopOutcome::Completed)
}

/// `round(100 · completed / total)`
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (100.0 * completed as f64 / total as f64).round().min(100.0) as u8
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn train_pass(
    model: &mut ModelEntity,
    optimizer: &mut dyn Optimizer,
    loss: LossType,
    source: &mut dyn BatchSource,
    epoch: usize,
) -> Result<PassTotals, TrainingError> {
    let mut totals = PassTotals::default();
    for (i, batch) in source.batches().enumerate() {
        let (value, output) = backprop(model, loss, &batch)
            .map_err(|source| TrainingError::Batch { epoch, batch: i + 1, source })?;
        optimizer.step(model.parameters_mut());
        tally(&mut totals, value, &output, &batch);
    }
    Ok(totals)
}

/// Forward, loss and backward for one batch; leaves fresh gradients in the
/// model's parameters.
fn backprop(model: &mut ModelEntity, loss: LossType, batch: &Batch) -> Result<(f64, Tensor), ShapeError> {
    model.zero_grad();
    let output = model.forward(&batch.input)?;
    let (value, grad) = loss.compute(&output, &batch.target)?;
    model.backward(&grad)?;
    Ok((value, output))
}

fn eval_pass(
    model: &mut ModelEntity,
    loss: LossType,
    source: &mut dyn BatchSource,
    epoch: usize,
) -> Result<PassTotals, TrainingError> {
    let mut totals = PassTotals::default();
    for (i, batch) in source.batches().enumerate() {
        let (value, output) = model.forward(&batch.input)
            .and_then(|output| Ok((loss.loss(&output, &batch.target)?, output)))
            .map_err(|source| TrainingError::Batch { epoch, batch: i + 1, source })?;
        tally(&mut totals, value, &output, &batch);
    }
    Ok(totals)
}

fn tally(totals: &mut PassTotals, loss: f64, output: &Tensor, batch: &Batch) {
    totals.loss_sum += loss;
    totals.batches += 1;
    totals.samples += output.rows();
    totals.correct += count_correct(output, &batch.target);
}

/// Rows whose output arg-max equals the target class. Targets are either one
/// class index per row or one-hot rows.
fn count_correct(output: &Tensor, target: &Tensor) -> usize {
    let rows = output.rows().min(target.rows());
    (0..rows)
        .filter(|&i| {
            let t = target.row(i);
            let class = if t.len() == 1 { t[0].round() as usize } else { argmax(t) };
            argmax(output.row(i)) == class
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::source::InMemoryDataset;
    use crate::network::spec::{LayerDescriptor, LayerKind, ModelArchitecture};
    use crate::optim::OptimizerType;

    fn classifier() -> ModelEntity {
        ModelEntity::build(&ModelArchitecture::new(vec![
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 2).with("out_features", 8),
            LayerDescriptor::new(LayerKind::Tanh),
            LayerDescriptor::new(LayerKind::Linear).with("in_features", 8).with("out_features", 2),
        ]))
        .unwrap()
    }

    fn blobs(n: usize) -> InMemoryDataset {
        let (features, classes) = crate::data::builtin_blobs(n);
        InMemoryDataset::from_rows(&features, &classes, 8).unwrap()
    }

    #[test]
    fn progress_percent_rounds() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 67);
        assert_eq!(progress_percent(3, 3), 100);
    }

    #[test]
    fn accuracy_accepts_indices_and_one_hot() {
        let out = Tensor::from_rows(&[vec![0.9, 0.1], vec![0.2, 0.8]]).unwrap();
        assert_eq!(count_correct(&out, &Tensor::from_slice(&[0.0, 0.0])), 1);
        let one_hot = Tensor::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(count_correct(&out, &one_hot), 2);
    }

    #[test]
    fn training_reduces_loss_on_separable_data() {
        let mut model = classifier();
        let hyper = Hyperparameters::new(40, 0.05, OptimizerType::Adam, LossType::CrossEntropy);
        let mut history = TrainingHistory::default();
        let outcome = train_loop(
            &mut model, &hyper, &mut blobs(40), &mut blobs(10),
            &AtomicBool::new(false), &mut history, |_, _| true,
        )
        .unwrap();

        assert_eq!(outcome, LoopOutcome::Completed);
        assert_eq!(history.len(), 40);
        assert!(history.train_loss[39] < history.train_loss[0]);
        assert!(history.train_accuracy[39] >= 90.0);
    }

    #[test]
    fn callback_returning_false_cancels_after_that_epoch() {
        let mut history = TrainingHistory::default();
        let hyper = Hyperparameters::new(5, 0.01, OptimizerType::Sgd, LossType::CrossEntropy);
        let outcome = train_loop(
            &mut classifier(), &hyper, &mut blobs(16), &mut blobs(4),
            &AtomicBool::new(false), &mut history, |stats, _| stats.epoch < 2,
        )
        .unwrap();
        assert_eq!(outcome, LoopOutcome::Cancelled { completed_epochs: 2 });
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn shape_errors_name_the_failing_batch() {
        let mut wide = InMemoryDataset::from_rows(&[vec![1.0, 2.0, 3.0]], &[0], 1).unwrap();
        let hyper = Hyperparameters::new(1, 0.01, OptimizerType::Sgd, LossType::CrossEntropy);
        let err = train_loop(
            &mut classifier(), &hyper, &mut wide, &mut blobs(4),
            &AtomicBool::new(false), &mut TrainingHistory::default(), |_, _| true,
        )
        .unwrap_err();
        assert!(matches!(err, TrainingError::Batch { epoch: 1, batch: 1, .. }));
    }
}
