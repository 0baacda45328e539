//! Reference hiring-pipeline application.
//!
//! An in-process board with a positions list and a position detail page made
//! of stage columns and candidate cards, backed by an in-memory
//! [`CandidateStore`]. Moving a card between columns is optimistic: the card
//! moves on `drop` and the `PUT /candidates/{id}` request goes out on the next
//! tick. A non-2xx response logs a console error and moves the card back.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::path::Path;

use crate::app::{Application, ConsoleMessage, DomEvent, EventEffect, EventKind};
use crate::dom::{Document, El, Element, NodeId};
use crate::interaction::DragProtocol;
use crate::network::{Backend, HttpMethod, HttpRequest, HttpResponse, Network};
use crate::result::{LanecheckError, LanecheckResult};
use crate::session::{Session, SessionConfig};

/// Base URL the application sends API requests to
pub const API_BASE: &str = "http://localhost:3010";

/// Back-button label on the position page
pub const BACK_LABEL: &str = "Volver a Posiciones";

// =============================================================================
// Fixture data
// =============================================================================

/// One step of a position's interview flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterviewStep {
    /// Step id
    pub id: u32,
    /// Display name
    pub name: String,
}

/// A candidate's application to a position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Candidate id
    pub id: u32,
    /// Application id
    pub application_id: u32,
    /// Full name
    pub full_name: String,
    /// Current interview step id
    pub current_interview_step: u32,
}

/// A position with its interview flow and applicants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFixture {
    /// Position id
    pub id: u32,
    /// Title
    pub title: String,
    /// Interview steps in order
    pub steps: Vec<InterviewStep>,
    /// Applicants
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

/// Seed data for a [`CandidateStore`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardFixture {
    /// Open positions
    pub positions: Vec<PositionFixture>,
}

impl Default for BoardFixture {
    fn default() -> Self {
        let step = |id, name: &str| InterviewStep {
            id,
            name: name.to_string(),
        };
        let candidate = |id, application_id, name: &str, current_interview_step| Candidate {
            id,
            application_id,
            full_name: name.to_string(),
            current_interview_step,
        };
        Self {
            positions: vec![
                PositionFixture {
                    id: 1,
                    title: "Senior Backend Engineer".to_string(),
                    steps: vec![
                        step(1, "Initial Screening"),
                        step(2, "Technical Interview"),
                        step(3, "Manager Interview"),
                    ],
                    candidates: vec![
                        candidate(1, 101, "Alice Johnson", 1),
                        candidate(2, 102, "Bob Smith", 1),
                        candidate(3, 103, "Carol White", 2),
                    ],
                },
                PositionFixture {
                    id: 2,
                    title: "Frontend Developer".to_string(),
                    steps: vec![step(4, "Initial Screening"), step(5, "Technical Interview")],
                    candidates: vec![candidate(4, 104, "Dan Brown", 4)],
                },
            ],
        }
    }
}

impl BoardFixture {
    /// Parse a fixture from JSON
    pub fn from_json(json: &str) -> LanecheckResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a fixture from a JSON file
    pub fn load(path: &Path) -> LanecheckResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

// =============================================================================
// Backend
// =============================================================================

/// In-memory API backing the board
#[derive(Debug, Clone, Default)]
pub struct CandidateStore {
    fixture: BoardFixture,
}

impl CandidateStore {
    /// Create a store seeded from a fixture
    #[must_use]
    pub const fn new(fixture: BoardFixture) -> Self {
        Self { fixture }
    }

    /// Current state of a candidate
    #[must_use]
    pub fn candidate(&self, id: u32) -> Option<&Candidate> {
        self.fixture
            .positions
            .iter()
            .flat_map(|p| p.candidates.iter())
            .find(|c| c.id == id)
    }

    fn position(&self, id: &str) -> Option<&PositionFixture> {
        let id: u32 = id.parse().ok()?;
        self.fixture.positions.iter().find(|p| p.id == id)
    }

    fn update_candidate(&mut self, id: &str, body: Option<&Value>) -> HttpResponse {
        let Ok(id) = id.parse::<u32>() else {
            return HttpResponse::error(400, "Invalid candidate id");
        };
        let field = |name: &str| body.and_then(|b| b.get(name)).and_then(as_id);
        let (Some(application_id), Some(step_id)) =
            (field("applicationId"), field("currentInterviewStep"))
        else {
            return HttpResponse::error(400, "applicationId and currentInterviewStep are required");
        };

        let Some(position) = self
            .fixture
            .positions
            .iter_mut()
            .find(|p| p.candidates.iter().any(|c| c.id == id))
        else {
            return HttpResponse::error(404, "Candidate not found");
        };
        if !position.steps.iter().any(|s| s.id == step_id) {
            return HttpResponse::error(400, "Invalid interview step");
        }
        let Some(candidate) = position
            .candidates
            .iter_mut()
            .find(|c| c.id == id && c.application_id == application_id)
        else {
            return HttpResponse::error(404, "Application not found");
        };

        candidate.current_interview_step = step_id;
        HttpResponse::new(
            200,
            json!({
                "message": "Candidate stage updated successfully",
                "data": candidate,
            }),
        )
    }
}

/// Accept ids sent either as numbers or numeric strings
fn as_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl Backend for CandidateStore {
    fn handle(&mut self, request: &HttpRequest) -> HttpResponse {
        let path = request.path().trim_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').collect();
        match (request.method, segments.as_slice()) {
            (HttpMethod::Get, ["positions"]) => {
                let list: Vec<Value> = self
                    .fixture
                    .positions
                    .iter()
                    .map(|p| json!({ "id": p.id, "title": p.title }))
                    .collect();
                HttpResponse::new(200, Value::Array(list))
            }
            (HttpMethod::Get, ["positions", id, "interviewFlow"]) => match self.position(id) {
                Some(p) => HttpResponse::new(
                    200,
                    json!({ "positionName": p.title, "interviewSteps": p.steps }),
                ),
                None => HttpResponse::error(404, "Position not found"),
            },
            (HttpMethod::Get, ["positions", id, "candidates"]) => match self.position(id) {
                Some(p) => HttpResponse::new(200, json!(p.candidates)),
                None => HttpResponse::error(404, "Position not found"),
            },
            (HttpMethod::Put, ["candidates", id]) => {
                let id = (*id).to_string();
                self.update_candidate(&id, request.body.as_ref())
            }
            _ => HttpResponse::error(404, "Not found"),
        }
    }
}

// =============================================================================
// Application
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Positions,
    Position(u32),
    NotFound,
}

fn route(path: &str) -> Route {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match segments.as_slice() {
        ["positions"] => Route::Positions,
        ["positions", id] => id.parse().map_or(Route::NotFound, Route::Position),
        _ => Route::NotFound,
    }
}

#[derive(Debug, Clone)]
enum Task {
    LoadPositions,
    LoadBoard(u32),
    Update {
        candidate_id: String,
        application_id: String,
        step_id: String,
        card: NodeId,
        origin: NodeId,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterviewFlow {
    position_name: String,
    interview_steps: Vec<InterviewStep>,
}

#[derive(Debug, Deserialize)]
struct PositionSummary {
    id: u32,
    title: String,
}

/// The hiring-pipeline board
#[derive(Debug, Clone, Default)]
pub struct PipelineApp {
    protocol: DragProtocol,
    queue: VecDeque<Task>,
    dragging: Option<NodeId>,
    console: Vec<ConsoleMessage>,
}

impl PipelineApp {
    /// Create a board whose cards listen for `protocol` events
    #[must_use]
    pub fn new(protocol: DragProtocol) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    /// Event protocol the cards listen for
    #[must_use]
    pub const fn protocol(&self) -> DragProtocol {
        self.protocol
    }

    fn log_error(&mut self, text: String) {
        tracing::debug!(%text, "console.error");
        self.console.push(ConsoleMessage::error(text));
    }

    fn load_positions(&mut self, doc: &mut Document, network: &mut Network) -> LanecheckResult<()> {
        let response = network.fetch(HttpRequest::get(format!("{API_BASE}/positions")));
        if !response.is_success() {
            self.log_error(format!("Error fetching positions: {}", response.status));
            doc.replace_children(doc.root(), vec![error_view("Error al cargar posiciones")]);
            return Ok(());
        }
        let positions: Vec<PositionSummary> = serde_json::from_value(response.body)?;
        doc.replace_children(doc.root(), vec![positions_view(&positions)]);
        Ok(())
    }

    fn load_board(
        &mut self,
        position_id: u32,
        doc: &mut Document,
        network: &mut Network,
    ) -> LanecheckResult<()> {
        let flow = network.fetch(HttpRequest::get(format!(
            "{API_BASE}/positions/{position_id}/interviewFlow"
        )));
        if !flow.is_success() {
            self.log_error(format!("Error fetching interview flow: {}", flow.status));
            doc.replace_children(doc.root(), vec![error_view("Posición no encontrada")]);
            return Ok(());
        }
        let flow: InterviewFlow = serde_json::from_value(flow.body)?;

        let candidates = network.fetch(HttpRequest::get(format!(
            "{API_BASE}/positions/{position_id}/candidates"
        )));
        if !candidates.is_success() {
            self.log_error(format!("Error fetching candidates: {}", candidates.status));
            doc.replace_children(doc.root(), vec![error_view("Error al cargar candidatos")]);
            return Ok(());
        }
        let candidates: Vec<Candidate> = serde_json::from_value(candidates.body)?;

        doc.replace_children(
            doc.root(),
            vec![board_view(&flow.position_name, &flow.interview_steps, &candidates)],
        );
        Ok(())
    }

    fn send_update(
        &mut self,
        network: &mut Network,
        candidate_id: &str,
        application_id: &str,
        step_id: &str,
    ) -> HttpResponse {
        let body = json!({
            "applicationId": numeric(application_id),
            "currentInterviewStep": numeric(step_id),
        });
        let response = network.fetch(HttpRequest::put(
            format!("{API_BASE}/candidates/{candidate_id}"),
            body,
        ));
        if !response.is_success() {
            self.log_error(format!(
                "Error updating candidate stage: {} {}",
                response.status, response.body
            ));
        }
        response
    }

    fn start_drag(&mut self, doc: &Document, target: NodeId) -> EventEffect {
        match doc.closest(target, is_candidate_card) {
            Some(card) => {
                self.dragging = Some(card);
                EventEffect::handled()
            }
            None => EventEffect::ignored(),
        }
    }

    fn drag_over(&self, doc: &Document, target: NodeId) -> EventEffect {
        if self.dragging.is_some() && doc.closest(target, is_stage_column).is_some() {
            EventEffect::handled()
        } else {
            EventEffect::ignored()
        }
    }

    fn drop_on(&mut self, doc: &mut Document, target: NodeId) -> EventEffect {
        let Some(card) = self.dragging.take() else {
            return EventEffect::ignored();
        };
        let Some(column) = doc.closest(target, is_stage_column) else {
            return EventEffect::ignored();
        };
        let Some(body) = doc.find_descendant(column, |el| el.has_class("card-body")) else {
            return EventEffect::ignored();
        };
        let Some(origin) = doc.get(card).and_then(Element::parent) else {
            return EventEffect::ignored();
        };
        if origin == body || !doc.move_node(card, body) {
            return EventEffect::handled();
        }

        let attr = |node: NodeId, name: &str| {
            doc.get(node)
                .and_then(|el| el.attribute(name))
                .unwrap_or_default()
                .to_string()
        };
        self.queue.push_back(Task::Update {
            candidate_id: attr(card, "data-candidate-id"),
            application_id: attr(card, "data-application-id"),
            step_id: attr(column, "data-step-id"),
            card,
            origin,
        });
        EventEffect::handled()
    }
}

fn numeric(value: &str) -> Value {
    value.parse::<u64>().map_or_else(|_| json!(value), |n| json!(n))
}

fn is_candidate_card(el: &Element) -> bool {
    el.attribute("data-testid") == Some("candidate-card")
}

fn is_stage_column(el: &Element) -> bool {
    el.attribute("data-testid") == Some("stage-column")
}

impl Application for PipelineApp {
    fn render(&mut self, path: &str, network: &mut Network) -> LanecheckResult<Document> {
        // Requests already in flight still reach the server.
        let in_flight: Vec<Task> = self.queue.drain(..).collect();
        for task in in_flight {
            if let Task::Update {
                candidate_id,
                application_id,
                step_id,
                ..
            } = task
            {
                self.send_update(network, &candidate_id, &application_id, &step_id);
            }
        }
        self.dragging = None;

        let doc = match route(path) {
            Route::Positions => {
                self.queue.push_back(Task::LoadPositions);
                Document::new(El::new("body").child(loading_view()))
            }
            Route::Position(id) => {
                self.queue.push_back(Task::LoadBoard(id));
                Document::new(El::new("body").child(loading_view()))
            }
            Route::NotFound => Document::new(El::new("body").child(
                El::new("div")
                    .class("container")
                    .child(El::new("h1").text("404"))
                    .child(El::new("p").text(format!("No route matches {path}"))),
            )),
        };
        Ok(doc)
    }

    fn dispatch(
        &mut self,
        document: &mut Document,
        event: &DomEvent,
        _network: &mut Network,
    ) -> LanecheckResult<EventEffect> {
        if document.get(event.target).is_none() {
            return Err(LanecheckError::application(format!(
                "event target {} does not exist",
                event.target.index()
            )));
        }
        let native = self.protocol == DragProtocol::NativeDrag;
        let effect = match event.kind {
            EventKind::Click => {
                if let Some(btn) = document.closest(event.target, |el| {
                    el.attribute("data-cy") == Some("view-process-btn")
                }) {
                    let id = document
                        .get(btn)
                        .and_then(|el| el.attribute("data-position-id"))
                        .unwrap_or_default();
                    EventEffect::navigate(format!("/positions/{id}"))
                } else if document
                    .closest(event.target, |el| el.attribute("data-action") == Some("back"))
                    .is_some()
                {
                    EventEffect::navigate("/positions")
                } else {
                    EventEffect::ignored()
                }
            }
            EventKind::DragStart if native => self.start_drag(document, event.target),
            EventKind::MouseDown if !native => self.start_drag(document, event.target),
            EventKind::DragOver if native => self.drag_over(document, event.target),
            EventKind::MouseMove if !native => self.drag_over(document, event.target),
            EventKind::Drop if native => self.drop_on(document, event.target),
            EventKind::MouseUp if !native => self.drop_on(document, event.target),
            _ => EventEffect::ignored(),
        };
        Ok(effect)
    }

    fn tick(&mut self, document: &mut Document, network: &mut Network) -> LanecheckResult<()> {
        let tasks: Vec<Task> = self.queue.drain(..).collect();
        for task in tasks {
            match task {
                Task::LoadPositions => self.load_positions(document, network)?,
                Task::LoadBoard(id) => self.load_board(id, document, network)?,
                Task::Update {
                    candidate_id,
                    application_id,
                    step_id,
                    card,
                    origin,
                } => {
                    let response =
                        self.send_update(network, &candidate_id, &application_id, &step_id);
                    if !response.is_success()
                        && document.is_attached(card)
                        && document.is_attached(origin)
                    {
                        document.move_node(card, origin);
                    }
                }
            }
        }
        Ok(())
    }

    fn take_console(&mut self) -> Vec<ConsoleMessage> {
        std::mem::take(&mut self.console)
    }
}

// =============================================================================
// Views
// =============================================================================

fn loading_view() -> El {
    El::new("div")
        .class("spinner-border")
        .attr("role", "status")
        .text("Cargando...")
}

fn error_view(message: &str) -> El {
    El::new("div")
        .class("container")
        .child(El::new("h2").text(message))
        .child(
            El::new("button")
                .class("btn")
                .attr("data-action", "back")
                .text(BACK_LABEL),
        )
}

fn positions_view(positions: &[PositionSummary]) -> El {
    El::new("div")
        .class("container")
        .child(El::new("h2").text("Posiciones"))
        .child(El::new("div").class("row").children(positions.iter().map(|p| {
            El::new("div").class("col-md-4").child(
                El::new("div")
                    .class("card")
                    .attr("data-cy", "position-card")
                    .child(
                        El::new("div")
                            .class("card-body")
                            .child(El::new("h5").class("card-title").text(&p.title))
                            .child(
                                El::new("button")
                                    .class("btn")
                                    .attr("data-cy", "view-process-btn")
                                    .attr("data-position-id", p.id.to_string())
                                    .text("Ver proceso"),
                            ),
                    ),
            )
        })))
}

fn board_view(title: &str, steps: &[InterviewStep], candidates: &[Candidate]) -> El {
    let column = |step: &InterviewStep| {
        let cards = candidates
            .iter()
            .filter(|c| c.current_interview_step == step.id)
            .map(|c| {
                El::new("div")
                    .class("card")
                    .attr("data-testid", "candidate-card")
                    .attr("data-candidate-id", c.id.to_string())
                    .attr("data-application-id", c.application_id.to_string())
                    .attr("draggable", "false")
                    .child(El::new("div").class("card-title").text(&c.full_name))
            });
        El::new("div").class("col-md-3").child(
            El::new("div")
                .class("card")
                .attr("data-testid", "stage-column")
                .attr("data-step-id", step.id.to_string())
                .child(El::new("div").class("card-header").text(&step.name))
                .child(El::new("div").class("card-body").children(cards)),
        )
    };
    El::new("div")
        .class("container")
        .child(
            El::new("button")
                .class("btn")
                .attr("data-action", "back")
                .text(BACK_LABEL),
        )
        .child(El::new("h2").text(title))
        .child(El::new("div").class("row").children(steps.iter().map(column)))
}

/// Fresh session over the reference board
#[must_use]
pub fn pipeline_session(fixture: BoardFixture, protocol: DragProtocol, config: SessionConfig) -> Session {
    Session::new(
        Box::new(PipelineApp::new(protocol)),
        Box::new(CandidateStore::new(fixture)),
        config,
    )
}
