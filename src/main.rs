//! Exam Pulse - exam paper question extraction and topic analysis server.

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use exam_pulse::analysis::Analyzer;
use exam_pulse::classify::{LocalClassifier, OpenRouterClassifier, QuestionClassifier};
use exam_pulse::config::{ConfigStore, ExtractionConfig, ServerSettings};
use exam_pulse::error::{AnalysisError, PlanError};
use exam_pulse::ocr::{combine_documents, OcrChain, OcrInput};
use exam_pulse::openrouter::OpenRouterClient;
use exam_pulse::plan::SmartPlanner;
use exam_pulse::schema::{
    now_unix_seconds, AnalysisReport, DashboardStats, PlanBasis, StoredPlan, StoredQuestion, StudyLog,
    StudyLogStats,
};
use exam_pulse::store::{PlanStore, QuestionStore, StudyLogStore};
use exam_pulse::study::{dashboard, study_log_statistics, StudyLogRequest};
use exam_pulse::{ExtractionReport, QuestionExtractor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type ApiError = (StatusCode, String);

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    configs: ConfigStore,
    analyzer: Arc<Analyzer>,
    store: QuestionStore,
    study_logs: StudyLogStore,
    plans: PlanStore,
    /// `None` without an OpenRouter key.
    planner: Option<Arc<SmartPlanner>>,
    days_until_exam: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "exam_pulse=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = ServerSettings::from_env();

    let configs = ConfigStore::load_or_builtin(&settings.config_dir)
        .with_context(|| format!("Failed to load profiles from {}", settings.config_dir.display()))?;
    info!("Loaded {} profiles: {:?}", configs.list().len(), configs.list());

    let openrouter = match &settings.openrouter_api_key {
        Some(key) => {
            let mut client = OpenRouterClient::new(key.clone()).context("Failed to build OpenRouter client")?;
            if let Some(model) = &settings.openrouter_model {
                client = client.with_model(model.clone());
            }
            info!("OpenRouter client initialized (model={})", client.model());
            Some(client)
        }
        None => {
            warn!("OPENROUTER_API_KEY not set, questions will get the local fallback classification and smart plans are disabled");
            None
        }
    };
    let classifier: Arc<dyn QuestionClassifier> = match &openrouter {
        Some(client) => Arc::new(OpenRouterClassifier::new(client.clone())),
        None => Arc::new(LocalClassifier),
    };

    let ocr = OcrChain::standard(reqwest::Client::new(), settings.docling_url.as_deref());
    info!("OCR providers: {:?}", ocr.provider_names());

    let store = QuestionStore::new();
    let state = AppState {
        configs,
        analyzer: Arc::new(Analyzer::new(ocr, classifier, store.clone())),
        store,
        study_logs: StudyLogStore::new(),
        plans: PlanStore::new(),
        planner: openrouter.map(|client| Arc::new(SmartPlanner::new(client))),
        days_until_exam: settings.days_until_exam,
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/configs", get(list_configs))
        .route("/configs/:name", get(get_config))
        .route("/extract", post(extract_text))
        .route("/combine-ocr", post(combine_ocr))
        .route("/analyze", post(analyze))
        .route("/questions", get(list_questions))
        .route("/study-logs", get(list_study_logs).post(create_study_log))
        .route("/dashboard", get(get_dashboard))
        .route("/smart-plan", get(smart_plan))
        .route("/plans", get(list_plans))
        .route("/plans/latest", get(latest_plan))
        .layer(DefaultBodyLimit::max(100 * 1024 * 1024)) // 100MB
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!("Server listening on http://{}", settings.bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

async fn health() -> &'static str {
    "ok"
}

async fn list_configs(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.configs.list())
}

async fn get_config(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ExtractionConfig>, StatusCode> {
    state.configs.get(&name).map(Json).ok_or(StatusCode::NOT_FOUND)
}

#[derive(Deserialize)]
struct ExtractRequest {
    documents: Vec<String>,
    profile: Option<String>,
}

/// Run the extraction pipeline on already-OCR'd text.
async fn extract_text(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractionReport>, ApiError> {
    let profile = profile(&state, request.profile.as_deref())?;
    let report = QuestionExtractor::new(&profile).extract_documents(&request.documents);
    Ok(Json(report))
}

#[derive(Serialize)]
struct CombinedOcr {
    files: Vec<String>,
    failed_files: Vec<String>,
    combined_text: String,
}

/// OCR every uploaded file and return the texts joined with file headers.
async fn combine_ocr(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CombinedOcr>, ApiError> {
    let uploads = read_uploads(multipart).await?;

    let mut documents = Vec::new();
    let mut failed_files = Vec::new();
    for input in &uploads {
        match state.analyzer.ocr().run_best(input).await {
            Some(ocr) => documents.push((input.filename.clone(), ocr.text)),
            None => failed_files.push(input.filename.clone()),
        }
    }

    if documents.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("No OCR text extracted from any files. Failed files: {:?}", failed_files),
        ));
    }

    Ok(Json(CombinedOcr {
        files: documents.iter().map(|(name, _)| name.clone()).collect(),
        failed_files,
        combined_text: combine_documents(&documents),
    }))
}

#[derive(Deserialize)]
struct AnalyzeQuery {
    profile: Option<String>,
}

/// Upload one or more pages of a paper and analyze its questions.
async fn analyze(
    State(state): State<AppState>,
    Query(query): Query<AnalyzeQuery>,
    multipart: Multipart,
) -> Result<Json<AnalysisReport>, ApiError> {
    let profile = profile(&state, query.profile.as_deref())?;
    let uploads = read_uploads(multipart).await?;
    info!(
        "Received {} files for analysis with profile: {}",
        uploads.len(),
        profile.name
    );

    let report = state.analyzer.analyze(uploads, &profile).await.map_err(|e| {
        let status = match &e {
            AnalysisError::NoText { .. } | AnalysisError::NoQuestions => StatusCode::BAD_REQUEST,
            AnalysisError::Authentication => StatusCode::UNAUTHORIZED,
            AnalysisError::Classification(_) => StatusCode::BAD_GATEWAY,
        };
        error!("Analysis failed: {}", e);
        (status, e.to_string())
    })?;

    info!("Analysis complete: {}", report.id);
    Ok(Json(report))
}

async fn list_questions(State(state): State<AppState>) -> Json<Vec<StoredQuestion>> {
    Json(state.store.all())
}

#[derive(Serialize)]
struct StudyLogList {
    logs: Vec<StudyLog>,
    statistics: StudyLogStats,
}

async fn list_study_logs(State(state): State<AppState>) -> Json<StudyLogList> {
    let logs = state.study_logs.all();
    let statistics = study_log_statistics(&logs);
    Json(StudyLogList { logs, statistics })
}

#[derive(Serialize)]
struct StudyLogCreated {
    message: &'static str,
    log: StudyLog,
}

async fn create_study_log(
    State(state): State<AppState>,
    Json(request): Json<StudyLogRequest>,
) -> Result<Json<StudyLogCreated>, ApiError> {
    let entry = request.validate().map_err(|e| {
        warn!("Rejected study log: {}", e);
        (StatusCode::BAD_REQUEST, e.to_string())
    })?;
    let log = state.study_logs.insert(entry);
    info!("Study log created: {} ({} on '{}')", log.id, log.entry.log_type, log.entry.topic);

    Ok(Json(StudyLogCreated {
        message: "Study log created successfully",
        log,
    }))
}

async fn get_dashboard(State(state): State<AppState>) -> Json<DashboardStats> {
    Json(dashboard(
        &state.store.questions(),
        &state.study_logs.all(),
        now_unix_seconds(),
        state.days_until_exam,
    ))
}

#[derive(Serialize)]
struct PlanGenerated {
    message: &'static str,
    plan: StoredPlan,
    based_on: PlanBasis,
}

/// Generate a revision plan from everything analyzed and logged so far.
async fn smart_plan(State(state): State<AppState>) -> Result<Json<PlanGenerated>, ApiError> {
    let planner = state.planner.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Smart plans need OPENROUTER_API_KEY to be set".to_string(),
        )
    })?;

    let (plan, based_on) = planner
        .generate(&state.store.questions(), &state.study_logs.all())
        .await
        .map_err(|e| {
            let status = match &e {
                PlanError::Authentication => StatusCode::UNAUTHORIZED,
                PlanError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                PlanError::Request(_) | PlanError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
            };
            error!("Smart plan generation failed: {}", e);
            (status, format!("Failed to generate smart plan: {}", e))
        })?;

    let plan = state.plans.insert(plan);
    info!("Smart plan generated: {}", plan.id);
    Ok(Json(PlanGenerated {
        message: "Smart plan generated successfully",
        plan,
        based_on,
    }))
}

async fn list_plans(State(state): State<AppState>) -> Json<Vec<StoredPlan>> {
    Json(state.plans.all())
}

async fn latest_plan(State(state): State<AppState>) -> Result<Json<StoredPlan>, StatusCode> {
    state.plans.latest().map(Json).ok_or(StatusCode::NOT_FOUND)
}

// ============================================================================
// Helper functions
// ============================================================================

fn profile(state: &AppState, name: Option<&str>) -> Result<ExtractionConfig, ApiError> {
    state.configs.resolve(name).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!(
                "Unknown profile: {}. Available: {:?}",
                name.unwrap_or_default(),
                state.configs.list()
            ),
        )
    })
}

/// Collect every `file` field of a multipart upload.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<OcrInput>, ApiError> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (StatusCode::BAD_REQUEST, format!("Multipart error: {}", e))
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("document").to_string();
        let data = field.bytes().await.map_err(|e| {
            (StatusCode::BAD_REQUEST, format!("Failed to read file {}: {}", filename, e))
        })?;
        if data.is_empty() {
            warn!("Skipping empty upload: {}", filename);
            continue;
        }
        info!("Received file: {} ({} bytes)", filename, data.len());
        uploads.push(OcrInput::new(filename, data.to_vec()));
    }

    if uploads.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "No files uploaded".to_string()));
    }
    Ok(uploads)
}
