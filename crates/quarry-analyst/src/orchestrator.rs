//! The analytics conversation protocol

use std::sync::Arc;

use quarry_catalog::{DatasetCatalog, Filters, ResolvedDataset};
use quarry_config::{AnalystConfig, PhaseEstimates};
use quarry_guard::{classify, extract_candidate, strip_internal_markup};
use quarry_llm::{CompletionClient, CompletionOptions, Message, Role, Usage};
use quarry_store::{ExecutionResult, QueryStore, TableSchema};

use crate::error::AnalystError;
use crate::intent;
use crate::prompt;
use crate::request::{AnalyticsRequest, AnalyticsResponse, DatasetResponse};
use crate::requirement::DataRequirement;

/// Answers analytics questions from declared datasets and guarded generated queries
///
/// Cheap to clone; clones share the completion client, store and catalog.
#[derive(Clone)]
pub struct Analyst {
    inner: Arc<Inner>,
}

struct Inner {
    client: CompletionClient,
    store: Arc<dyn QueryStore>,
    catalog: Arc<DatasetCatalog>,
    requirements: Vec<DataRequirement>,
    system_prompt: String,
    schema_guide: Option<String>,
    introspect_schema: bool,
    assistant_name: String,
    draft_attempts: u32,
    execution_attempts: u32,
    temperature: f32,
    max_tokens: u32,
    context_rows: usize,
    estimates: PhaseEstimates,
}

impl std::fmt::Debug for Analyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyst")
            .field("client", &self.inner.client)
            .field("datasets", &self.inner.catalog.len())
            .field("draft_attempts", &self.inner.draft_attempts)
            .field("execution_attempts", &self.inner.execution_attempts)
            .finish_non_exhaustive()
    }
}

/// A declared dataset together with its rows
struct FetchedDataset {
    resolved: ResolvedDataset,
    result: ExecutionResult,
}

/// Outcome of the drafting step
enum Draft {
    Query { reply: String, candidate: String },
    /// No delimited query within the attempt bound
    FreeText(String),
}

impl Analyst {
    pub fn new(
        client: CompletionClient,
        store: Arc<dyn QueryStore>,
        catalog: Arc<DatasetCatalog>,
        config: &AnalystConfig,
    ) -> Result<Self, AnalystError> {
        let requirements = config
            .requirements
            .iter()
            .map(|rule| {
                DataRequirement::compile(rule)
                    .map_err(|e| AnalystError::Config(format!("invalid requirement pattern '{}': {e}", rule.pattern)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| prompt::default_system_prompt(&config.assistant_name));

        Ok(Self {
            inner: Arc::new(Inner {
                client,
                store,
                catalog,
                requirements,
                system_prompt,
                schema_guide: config.schema_guide.clone(),
                introspect_schema: config.introspect_schema,
                assistant_name: config.assistant_name.clone(),
                draft_attempts: config.draft_attempts.max(1),
                execution_attempts: config.execution_attempts.max(1),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
                context_rows: config.context_rows,
                estimates: config.estimates,
            }),
        })
    }

    pub fn client(&self) -> &CompletionClient {
        &self.inner.client
    }

    pub fn catalog(&self) -> &DatasetCatalog {
        &self.inner.catalog
    }

    /// Tables and columns of the store
    pub async fn schema(&self) -> Result<Vec<TableSchema>, AnalystError> {
        Ok(self.inner.store.schema().await?)
    }

    /// Resolve and run a declared dataset without any completion call
    pub async fn fetch_dataset(&self, id: &str, filters: &Filters) -> Result<DatasetResponse, AnalystError> {
        let fetched = self
            .resolve_and_run(id, filters)
            .await?
            .ok_or_else(|| AnalystError::UnknownDataset(id.to_owned()))?;

        Ok(DatasetResponse {
            success: true,
            duration_ms: fetched.result.duration_ms(),
            id: fetched.resolved.id,
            sql: fetched.resolved.query,
            filters: fetched.resolved.applied,
            rows: fetched.result.rows,
            row_count: fetched.result.row_count,
            columns: fetched.result.columns,
        })
    }

    /// Answer one analytics request
    ///
    /// A declared dataset is fetched directly and narrated in one completion
    /// call. Otherwise the backend drafts a delimited query, the guard checks
    /// it, and the store runs it within the configured attempt bounds before
    /// the rows are narrated.
    #[tracing::instrument(level = "debug", skip_all, fields(chart_id = request.chart_id()))]
    pub async fn answer(&self, request: AnalyticsRequest) -> Result<AnalyticsResponse, AnalystError> {
        let inner = &*self.inner;
        let history = request.history();
        let question = request.question();
        let chart_id = request.chart_id();

        if question.is_none() && history.is_empty() && chart_id.is_none() {
            return Err(AnalystError::InvalidRequest(
                "a question, a chartId or a conversation history is required".to_owned(),
            ));
        }

        let latest = AnalyticsRequest::latest_user_text(&history, question);
        let user_spoke_last = question.is_some() || history.last().is_some_and(|m| m.role == Role::User);

        if chart_id.is_none()
            && user_spoke_last
            && let Some(intent) = latest.as_deref().and_then(intent::detect)
        {
            tracing::debug!(?intent, "answered without a completion call");
            return Ok(AnalyticsResponse::reply_only(intent::canned_reply(
                intent,
                &inner.assistant_name,
            )));
        }

        let dataset = match chart_id {
            Some(id) => {
                let no_filters = Filters::new();
                let filters = request.filters.as_ref().unwrap_or(&no_filters);
                let fetched = self.resolve_and_run(id, filters).await?;

                if fetched.is_none() {
                    tracing::warn!(chart_id = id, "unknown dataset requested, answering without one");
                }

                fetched
            }
            None => None,
        };

        let mut turn = Turn::new(inner);
        turn.push(Message::system(inner.system_prompt.clone()));

        if let Some(guide) = &inner.schema_guide {
            turn.push(Message::system(guide.clone()));
        }

        if inner.introspect_schema {
            match inner.store.schema().await {
                Ok(tables) => turn.push(Message::system(prompt::schema_summary(&TableSchema::summarize(&tables)))),
                Err(error) => tracing::warn!(error = %error, "schema introspection failed, continuing without it"),
            }
        }

        match &dataset {
            Some(fetched) => turn.push(Message::system(prompt::dataset_context(
                &fetched.resolved.id,
                &fetched.resolved.applied,
                &fetched.resolved.query,
                &fetched.result,
                inner.context_rows,
            ))),
            None => turn.push(Message::system(prompt::GENERAL_CONVERSATION)),
        }

        let question_repeats_history = question.is_some_and(|q| {
            history
                .last()
                .is_some_and(|m| m.role == Role::User && m.content.trim() == q)
        });

        turn.messages.extend(history);

        match question {
            Some(q) if !question_repeats_history => turn.push(Message::user(q)),
            Some(_) => {}
            None if !user_spoke_last => turn.push(Message::user(prompt::DEFAULT_QUESTION)),
            None => {}
        }

        let question_text = latest.unwrap_or_else(|| prompt::DEFAULT_QUESTION.to_owned());

        let dataset = match dataset {
            Some(fetched) if !fetched.result.is_empty() => {
                return turn.narrate_dataset(fetched, &question_text, chart_id).await;
            }
            other => other,
        };

        tracing::debug!(has_dataset = dataset.is_some(), "drafting a query");
        turn.push(Message::system(prompt::draft_instruction()));

        match turn.draft().await? {
            Draft::Query { reply, candidate } => turn.run_query(reply, candidate, chart_id).await,
            Draft::FreeText(reply) => {
                tracing::info!(attempts = inner.draft_attempts, "no query proposed, returning the free-text reply");
                let response = turn.finish(&reply, chart_id);

                Ok(match dataset {
                    Some(fetched) => response.with_result(&fetched.resolved.query, fetched.result),
                    None => response,
                })
            }
        }
    }

    async fn resolve_and_run(&self, id: &str, filters: &Filters) -> Result<Option<FetchedDataset>, AnalystError> {
        let Some(resolved) = self.inner.catalog.resolve(id, filters)? else {
            return Ok(None);
        };

        let result = self
            .inner
            .store
            .execute(&resolved.query, &resolved.params)
            .await
            .map_err(|source| AnalystError::Dataset {
                id: id.to_owned(),
                source,
            })?;

        Ok(Some(FetchedDataset { resolved, result }))
    }
}

/// Conversation state of one request
struct Turn<'a> {
    inner: &'a Inner,
    messages: Vec<Message>,
    usage: Usage,
    backend_used: Option<String>,
}

impl<'a> Turn<'a> {
    const fn new(inner: &'a Inner) -> Self {
        Self {
            inner,
            messages: Vec::new(),
            usage: Usage {
                prompt_tokens: 0,
                completion_tokens: 0,
            },
            backend_used: None,
        }
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Record the backend's reply and answer it
    fn follow_up(&mut self, reply: &str, instruction: String) {
        self.messages.push(Message::assistant(reply));
        self.messages.push(Message::user(instruction));
    }

    async fn complete(&mut self, phase: &'static str, estimated_tokens: u64) -> Result<String, AnalystError> {
        let options =
            CompletionOptions::estimated(estimated_tokens).with_sampling(self.inner.temperature, self.inner.max_tokens);

        let completion = self.inner.client.complete(self.messages.clone(), options).await?;

        tracing::debug!(
            phase,
            backend = %completion.backend_id,
            total_tokens = completion.usage.total(),
            "completion received"
        );

        self.usage += completion.usage;
        self.backend_used = Some(completion.backend_id);

        Ok(completion.text)
    }

    /// Narrate a non-empty dataset
    ///
    /// When a data requirement fires the backend is asked for a query
    /// instead, and a query in its reply is run like a drafted one.
    async fn narrate_dataset(
        mut self,
        fetched: FetchedDataset,
        question: &str,
        chart_id: Option<&str>,
    ) -> Result<AnalyticsResponse, AnalystError> {
        let inner = self.inner;
        let fired = inner.requirements.iter().find(|rule| rule.fires(question, &fetched.result));

        let instruction = match fired {
            Some(rule) => {
                tracing::debug!(dataset = %fetched.resolved.id, "dataset lacks the columns this question needs");
                prompt::dataset_insufficient(rule.instruction())
            }
            None => prompt::DATASET_SUFFICIENT.to_owned(),
        };

        // The instruction goes right before the question it applies to
        let at = self.messages.len().saturating_sub(1);
        self.messages.insert(at, Message::system(instruction));

        let reply = self
            .complete("dataset_narrative", inner.estimates.dataset_narrative)
            .await?;

        let Some(candidate) = fired.and_then(|_| extract_candidate(&reply)) else {
            return Ok(self
                .finish(&reply, chart_id)
                .with_result(&fetched.resolved.query, fetched.result));
        };

        if let Err(rejection) = classify(&candidate) {
            // Only the dataset is shown; no correction round is attempted
            tracing::warn!(reason = %rejection, dataset = %fetched.resolved.id, "proposed query refused");
            self.follow_up(&reply, prompt::dataset_insights_only(&rejection.to_string()));

            let insights = self
                .complete("dataset_insights", inner.estimates.dataset_narrative)
                .await?;

            return Ok(self
                .finish(&insights, chart_id)
                .with_result(&fetched.resolved.query, fetched.result));
        }

        self.run_query(reply, candidate, chart_id).await
    }

    /// Ask for a delimited query, nudging after each reply without one
    async fn draft(&mut self) -> Result<Draft, AnalystError> {
        let attempts = self.inner.draft_attempts;
        let mut reply = String::new();

        for attempt in 1..=attempts {
            reply = self.complete("draft", self.inner.estimates.draft).await?;

            if let Some(candidate) = extract_candidate(&reply) {
                return Ok(Draft::Query { reply, candidate });
            }

            tracing::debug!(attempt, "draft reply carried no query");

            if attempt < attempts {
                self.follow_up(&reply, prompt::missing_query());
            }
        }

        Ok(Draft::FreeText(reply))
    }

    /// Validate, execute and narrate a proposed query
    ///
    /// Store calls are bounded by `execution_attempts`, and so are the
    /// completions spent on corrections.
    async fn run_query(
        mut self,
        mut reply: String,
        candidate: String,
        chart_id: Option<&str>,
    ) -> Result<AnalyticsResponse, AnalystError> {
        let inner = self.inner;
        let limit = inner.execution_attempts;

        let mut query = self.validate(&mut reply, candidate).await?;
        let mut executions = 0;
        let mut corrections = 0;

        let result = loop {
            executions += 1;

            let error = match inner.store.execute(&query, &[]).await {
                Ok(result) => break result,
                Err(error) => error.to_string(),
            };

            tracing::warn!(attempt = executions, error = %error, "generated query failed");

            if executions >= limit {
                return Err(AnalystError::ExecutionFailed(error));
            }

            self.follow_up(&reply, prompt::execution_failed(&error));

            query = loop {
                if corrections >= limit - 1 {
                    return Err(AnalystError::ExecutionFailed(error));
                }

                corrections += 1;
                reply = self
                    .complete("execution_correction", inner.estimates.execution_correction)
                    .await?;

                match extract_candidate(&reply) {
                    Some(next) => break guard(next)?,
                    None => self.follow_up(&reply, prompt::still_missing_query()),
                }
            };
        };

        tracing::debug!(row_count = result.row_count, executions, "generated query succeeded");

        self.follow_up(&reply, prompt::result_summary(&result));
        let narrative = self.complete("narrative", inner.estimates.narrative).await?;

        Ok(self.finish(&narrative, chart_id).with_result(&query, result))
    }

    /// Guard a candidate, allowing exactly one corrective round-trip
    async fn validate(&mut self, reply: &mut String, candidate: String) -> Result<String, AnalystError> {
        let rejection = match classify(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(rejection) => rejection,
        };

        tracing::warn!(reason = %rejection, "proposed query refused, asking for a correction");

        self.follow_up(reply, prompt::unsupported_statement(&rejection.to_string()));
        *reply = self
            .complete("unsafe_correction", self.inner.estimates.unsafe_correction)
            .await?;

        let corrected = extract_candidate(reply).ok_or_else(|| AnalystError::UnsafeQuery {
            reason: "the corrected reply carried no query".to_owned(),
        })?;

        guard(corrected)
    }

    fn finish(self, reply: &str, chart_id: Option<&str>) -> AnalyticsResponse {
        let mut response = AnalyticsResponse::reply_only(strip_internal_markup(reply));
        response.chart_id = chart_id.map(str::to_owned);
        response.backend_used = self.backend_used;
        response.usage = Some(self.usage);
        response
    }
}

fn guard(candidate: String) -> Result<String, AnalystError> {
    match classify(&candidate) {
        Ok(()) => Ok(candidate),
        Err(rejection) => {
            tracing::warn!(reason = %rejection, "proposed query refused");
            Err(AnalystError::UnsafeQuery {
                reason: rejection.to_string(),
            })
        }
    }
}
