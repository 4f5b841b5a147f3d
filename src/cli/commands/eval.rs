//! Evaluation command implementations.

use crate::cli::preflight::{self, Operation};
use crate::cli::{EvalAction, JudgeAction, Output};
use crate::config::{Prompts, Settings};
use crate::evaluation::prompt_eval::read_question_ids;
use crate::evaluation::{
    load_evaluation_dataset, AnswerRelevancyEvaluator, ContextRelevancyEvaluator,
    EvaluationHarness, EvaluationMatrix, EvaluationStore, PairwiseEvaluator, PromptEvaluation,
    PromptTemplate,
};
use crate::llm::load_llm;
use crate::rag::{EngineBuilder, EngineConfig, QueryEngine};
use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// Run an evaluation subcommand.
pub async fn run_eval(action: &EvalAction, settings: Settings) -> Result<()> {
    match action {
        EvalAction::Init => run_init(&settings),
        EvalAction::Run {
            dataset,
            collections,
            models,
            modes,
        } => run_matrix(dataset.clone(), collections, models, modes, settings).await,
        EvalAction::Judge { judge } => run_judge(judge, settings).await,
        EvalAction::Prompts {
            ids,
            templates,
            collections,
            models,
            results_dir,
        } => {
            run_prompts(
                ids.clone(),
                templates,
                collections,
                models,
                results_dir.clone(),
                settings,
            )
            .await
        }
    }
}

fn run_init(settings: &Settings) -> Result<()> {
    let path = settings.evaluation_db_path();
    let store = EvaluationStore::open(&path)?;
    store.create_tables()?;
    Output::success(&format!("Evaluation tables ready in {}", path.display()));
    Ok(())
}

fn open_store(settings: &Settings) -> Result<Arc<EvaluationStore>> {
    let store = EvaluationStore::open(&settings.evaluation_db_path())?;
    store.create_tables()?;
    Ok(Arc::new(store))
}

fn engine_builder(settings: Settings) -> Result<EngineBuilder> {
    let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;
    Ok(EngineBuilder::new(settings, prompts)?)
}

fn or_default(values: &[String], default: &[String]) -> Vec<String> {
    if values.is_empty() {
        default.to_vec()
    } else {
        values.to_vec()
    }
}

async fn run_matrix(
    dataset: Option<PathBuf>,
    collections: &[String],
    models: &[String],
    modes: &[String],
    settings: Settings,
) -> Result<()> {
    let mut matrix = EvaluationMatrix::from_settings(&settings)?;
    if !collections.is_empty() {
        matrix.collections = collections.to_vec();
    }
    if !models.is_empty() {
        matrix.models = models.to_vec();
    }
    if !modes.is_empty() {
        matrix.chat_modes = modes
            .iter()
            .map(|m| m.parse())
            .collect::<crate::Result<Vec<_>>>()?;
    }

    let dataset = dataset.unwrap_or_else(|| settings.resolve(&settings.evaluation.dataset_path));
    let rows = load_evaluation_dataset(&dataset)?;

    for model in &matrix.models {
        preflight::check(Operation::Answer { model: model.as_str() }, &settings).await?;
    }

    let store = open_store(&settings)?;
    let engines = Arc::new(engine_builder(settings)?);
    let harness = EvaluationHarness::new(engines, store, &rows);

    Output::info(&format!(
        "Evaluating {} questions over {} combinations",
        harness.questions().len(),
        matrix.combinations()
    ));

    let spinner = Output::spinner("Answering questions...");
    let result = harness.run(&matrix).await;
    spinner.finish_and_clear();

    match result {
        Ok(report) => {
            Output::success(&format!(
                "Evaluation finished: {} written, {} skipped",
                report.written, report.skipped
            ));
            Ok(())
        }
        Err(e) => {
            Output::error(&format!("Evaluation stopped: {}", e));
            Output::info("Rerun the command to resume at the first missing record.");
            Err(e.into())
        }
    }
}

async fn query_engine(
    settings: &Settings,
    collection: Option<String>,
    model: Option<String>,
) -> Result<QueryEngine> {
    let mut config = EngineConfig::from_settings(settings)?;
    if let Some(collection) = collection {
        config.collection = collection;
    }
    if let Some(model) = model {
        config.model = model;
    }
    preflight::check(Operation::Answer { model: config.model.as_str() }, settings).await?;
    Ok(engine_builder(settings.clone())?.query_engine(&config).await?)
}

async fn run_judge(action: &JudgeAction, settings: Settings) -> Result<()> {
    let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;

    let result = match action {
        JudgeAction::AnswerRelevancy {
            query,
            response,
            collection,
            model,
        } => {
            let response = match response {
                Some(response) => response.clone(),
                None => {
                    let engine = query_engine(&settings, collection.clone(), model.clone()).await?;
                    engine.query(query).await?.response
                }
            };
            Output::kv("Response", &response);

            let judge_model = &settings.evaluation.judge_model;
            preflight::check(Operation::Judge { model: judge_model.as_str() }, &settings).await?;
            let judge = load_llm(judge_model, &settings.llm)?;
            AnswerRelevancyEvaluator::new(judge, &prompts.judge)
                .evaluate(query, &response)
                .await?
        }

        JudgeAction::ContextRelevancy {
            query,
            contexts,
            collection,
        } => {
            let contexts = if contexts.is_empty() {
                let engine = query_engine(&settings, collection.clone(), None).await?;
                engine.query(query).await?.contexts()
            } else {
                contexts.clone()
            };
            if contexts.is_empty() {
                return Err(anyhow!("No contexts to judge"));
            }

            let judge_model = &settings.evaluation.judge_model;
            preflight::check(Operation::Judge { model: judge_model.as_str() }, &settings).await?;
            let judge = load_llm(judge_model, &settings.llm)?;
            ContextRelevancyEvaluator::new(judge, &prompts.judge)
                .evaluate(query, &contexts)
                .await?
        }

        JudgeAction::Pairwise {
            query,
            response,
            second_response,
            reference,
        } => {
            let judge_model = &settings.evaluation.pairwise_judge_model;
            preflight::check(Operation::Judge { model: judge_model.as_str() }, &settings).await?;
            let judge = load_llm(judge_model, &settings.llm)?;
            PairwiseEvaluator::new(judge, &prompts.judge)
                .evaluate(query, response, second_response, reference.as_deref())
                .await?
        }
    };

    Output::header("Judgement");
    Output::evaluation(&result);
    Ok(())
}

async fn run_prompts(
    ids: Option<PathBuf>,
    templates: &[u8],
    collections: &[String],
    models: &[String],
    results_dir: Option<PathBuf>,
    settings: Settings,
) -> Result<()> {
    let ids_path = ids.unwrap_or_else(|| settings.resolve(&settings.evaluation.question_ids_path));
    let ids = read_question_ids(&ids_path)?;

    let templates = if templates.is_empty() {
        PromptTemplate::ALL.to_vec()
    } else {
        templates
            .iter()
            .map(|id| {
                PromptTemplate::from_id(*id)
                    .ok_or_else(|| anyhow!("Unknown prompt template {} (expected 0-4)", id))
            })
            .collect::<Result<Vec<_>>>()?
    };
    let collections = or_default(collections, &settings.evaluation.collections);
    let models = or_default(models, &settings.evaluation.models);
    let results_dir =
        results_dir.unwrap_or_else(|| settings.resolve(&settings.evaluation.results_dir));

    for model in &models {
        preflight::check(Operation::Answer { model: model.as_str() }, &settings).await?;
    }

    let store = open_store(&settings)?;
    let questions = PromptEvaluation::questions(&store, &ids)?;
    let runs = questions.len() * templates.len() * collections.len() * models.len();
    Output::info(&format!(
        "Running {} prompt evaluations ({} questions)",
        runs,
        questions.len()
    ));

    let evaluation = PromptEvaluation::new(Arc::new(engine_builder(settings)?), &results_dir);
    let spinner = Output::spinner("Comparing prompts...");
    let result = evaluation
        .run(&questions, &templates, &collections, &models)
        .await;
    spinner.finish_and_clear();

    let written = result?;
    Output::success(&format!(
        "Wrote {} transcripts to {}",
        written,
        results_dir.display()
    ));
    Ok(())
}
