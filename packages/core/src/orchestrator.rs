use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use timewalk_model_provider::{HistoricalEvent, JourneyGateway, ProviderError, UserImage};
use timewalk_types::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use timewalk_types::utils::data_url;
use tokio::runtime::Handle;

use crate::credentials::ApiKeyStore;
use crate::journey::{self, JourneyGraph, NodeKind, NodePatch, ROOT_NODE_ID, layout::LayoutPolicy};

pub const STATUS_TIMELINE_LOADING: &str = "The timeline is being generated...";
pub const STATUS_TIMELINE_READY: &str = "Click on a portal to generate a scene.";
pub const STATUS_CRAFTING_PROMPT: &str = "Crafting a unique prompt...";
pub const STATUS_ENTERING_PORTAL: &str = "Entering the time portal...";
pub const STATUS_GENERATION_FAILED: &str = "Generation failed. Try again.";
pub const TITLE_READY_TO_TRAVEL: &str = "Ready to Travel";
pub const TITLE_UPLOAD_FAILED: &str = "Upload Failed";
pub const STATUS_UPLOAD_FAILED: &str = "Please try another image.";

pub const CREDENTIAL_REJECTED_MESSAGE: &str =
    "Your API Key is invalid or expired. Please enter a new one.";

/// Which flow a credential rejection came from. Decides how the originating
/// node is rolled back.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowOrigin {
    Upload,
    Generation { node_id: String },
    Expansion { node_id: String },
}

/// Completion messages flows send back to the UI thread. Applied strictly in
/// emission order, so per-node status updates land in sequence.
#[derive(Clone, Debug)]
pub enum FlowEvent {
    TimelineReady { events: Vec<HistoricalEvent> },
    TimelineFailed,
    StageChanged { node_id: String, status: String },
    SceneReady { node_id: String, image: String },
    SceneFailed { node_id: String },
    ExpansionReady { node_id: String, events: Vec<HistoricalEvent> },
    ExpansionSettled { node_id: String },
    CredentialRejected { origin: FlowOrigin },
}

/// Surface-level effects the view has to react to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    /// Show the credential overlay. `message` is set when an existing key
    /// was just rejected, absent when none was ever entered.
    CredentialRequired { message: Option<String> },
}

/// Wires view intents to gateway calls and gateway results back into graph
/// mutations. The orchestrator is the graph's only writer; flows communicate
/// exclusively through the event channel and all mutations happen on the
/// caller's (UI) thread in [`Orchestrator::apply_event`].
///
/// Credential and user image are snapshotted when a flow starts and never
/// re-read mid-flight. A flow that outlives a credential purge completes and
/// applies its result; that race is accepted.
pub struct Orchestrator {
    gateway: Arc<JourneyGateway>,
    credentials: ApiKeyStore,
    runtime: Handle,
    user_image: Option<UserImage>,
    in_flight: HashSet<String>,
    events_tx: UnboundedSender<FlowEvent>,
    events_rx: UnboundedReceiver<FlowEvent>,
}

impl Orchestrator {
    pub fn new(gateway: Arc<JourneyGateway>, credentials: ApiKeyStore, runtime: Handle) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Orchestrator {
            gateway,
            credentials,
            runtime,
            user_image: None,
            in_flight: HashSet::new(),
            events_tx,
            events_rx,
        }
    }

    pub fn has_credential(&self) -> bool {
        self.credentials.get().is_some()
    }

    pub fn submit_credential(&mut self, key: &str) {
        self.credentials.set(key);
    }

    pub fn user_image(&self) -> Option<&UserImage> {
        self.user_image.as_ref()
    }

    /// Number of flows started but not yet settled.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn credential_or_prompt(&self) -> Result<String, Notice> {
        self.credentials
            .get()
            .ok_or(Notice::CredentialRequired { message: None })
    }

    /// Root upload intent: capture the selfie, mark the root busy and fetch
    /// the first ring of eras.
    pub fn handle_upload(&mut self, graph: &mut JourneyGraph, path: &Path) -> Option<Notice> {
        if self.in_flight.contains(ROOT_NODE_ID) {
            tracing::debug!("ignoring upload while the timeline flow is in flight");
            return None;
        }
        let credential = match self.credential_or_prompt() {
            Ok(credential) => credential,
            Err(notice) => return Some(notice),
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::error!(%err, path = %path.display(), "failed to read uploaded image");
                graph.upsert_node_data(
                    ROOT_NODE_ID,
                    NodePatch {
                        title: Some(TITLE_UPLOAD_FAILED.to_string()),
                        status: Some(STATUS_UPLOAD_FAILED.to_string()),
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                return None;
            }
        };

        let image = UserImage::from_bytes(&data_url::mime_for_path(path), &bytes);
        self.user_image = Some(image.clone());

        graph.upsert_node_data(
            ROOT_NODE_ID,
            NodePatch {
                image: Some(image.to_data_url()),
                title: Some(TITLE_READY_TO_TRAVEL.to_string()),
                status: Some(STATUS_TIMELINE_LOADING.to_string()),
                busy: Some(true),
                ..Default::default()
            },
        );

        self.in_flight.insert(ROOT_NODE_ID.to_string());
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        self.runtime.spawn(async move {
            let event = match gateway.list_initial_events(&credential).await {
                Ok(events) => FlowEvent::TimelineReady { events },
                Err(err) if err.is_auth() => {
                    tracing::warn!(%err, "credential rejected while listing initial eras");
                    FlowEvent::CredentialRejected {
                        origin: FlowOrigin::Upload,
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "initial timeline flow failed");
                    FlowEvent::TimelineFailed
                }
            };
            let _ = events_tx.send(event);
        });
        None
    }

    /// Generation intent for one era node: refine its prompt, then composite
    /// the user into the scene.
    pub fn handle_generate(&mut self, graph: &mut JourneyGraph, node_id: &str) -> Option<Notice> {
        if self.in_flight.contains(node_id) {
            tracing::debug!(node = node_id, "ignoring generation for busy node");
            return None;
        }
        let Some(node) = graph.node(node_id) else {
            tracing::warn!(node = node_id, "generation requested for unknown node");
            return None;
        };
        if node.kind != NodeKind::Event || node.busy || node.image.is_some() {
            tracing::debug!(node = node_id, "node is not eligible for generation");
            return None;
        }
        let Some(base_prompt) = node.prompt.clone() else {
            tracing::warn!(node = node_id, "node carries no scene prompt");
            return None;
        };
        // Should not happen through the UI: the action is only offered after
        // a successful upload.
        let Some(user_image) = self.user_image.clone() else {
            tracing::warn!(node = node_id, "generation requested before any selfie upload");
            return None;
        };
        let credential = match self.credential_or_prompt() {
            Ok(credential) => credential,
            Err(notice) => return Some(notice),
        };

        graph.upsert_node_data(
            node_id,
            NodePatch {
                status: Some(STATUS_CRAFTING_PROMPT.to_string()),
                busy: Some(true),
                ..Default::default()
            },
        );

        self.in_flight.insert(node_id.to_string());
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let node_id = node_id.to_string();
        self.runtime.spawn(async move {
            let event = match gateway
                .synthesize_scene_prompt(&credential, &base_prompt)
                .await
            {
                Ok(detailed_prompt) => {
                    let _ = events_tx.send(FlowEvent::StageChanged {
                        node_id: node_id.clone(),
                        status: STATUS_ENTERING_PORTAL.to_string(),
                    });
                    match gateway
                        .synthesize_image(&credential, &user_image, &detailed_prompt)
                        .await
                    {
                        Ok(image) => FlowEvent::SceneReady {
                            node_id: node_id.clone(),
                            image,
                        },
                        Err(err) if err.is_auth() => FlowEvent::CredentialRejected {
                            origin: FlowOrigin::Generation {
                                node_id: node_id.clone(),
                            },
                        },
                        Err(err) => {
                            tracing::warn!(%err, node = %node_id, "scene composition failed");
                            FlowEvent::SceneFailed {
                                node_id: node_id.clone(),
                            }
                        }
                    }
                }
                Err(err) if err.is_auth() => FlowEvent::CredentialRejected {
                    origin: FlowOrigin::Generation {
                        node_id: node_id.clone(),
                    },
                },
                Err(err) => {
                    tracing::warn!(%err, node = %node_id, "scene prompt flow failed");
                    FlowEvent::SceneFailed {
                        node_id: node_id.clone(),
                    }
                }
            };
            let _ = events_tx.send(event);
        });
        None
    }

    /// Expansion intent for an era node that already has an image: fetch
    /// sub-events and fan them out beneath it.
    pub fn handle_expand(&mut self, graph: &mut JourneyGraph, node_id: &str) -> Option<Notice> {
        if self.in_flight.contains(node_id) {
            tracing::debug!(node = node_id, "ignoring expansion for busy node");
            return None;
        }
        let Some(node) = graph.node(node_id) else {
            tracing::warn!(node = node_id, "expansion requested for unknown node");
            return None;
        };
        if node.kind != NodeKind::Event || node.busy || node.image.is_none() {
            tracing::debug!(node = node_id, "node is not eligible for expansion");
            return None;
        }
        let Some(prompt) = node.prompt.clone() else {
            tracing::warn!(node = node_id, "node carries no scene prompt");
            return None;
        };
        let base_event = HistoricalEvent {
            title: node.title.clone(),
            prompt,
        };
        let credential = match self.credential_or_prompt() {
            Ok(credential) => credential,
            Err(notice) => return Some(notice),
        };

        graph.upsert_node_data(
            node_id,
            NodePatch {
                busy: Some(true),
                ..Default::default()
            },
        );

        self.in_flight.insert(node_id.to_string());
        let gateway = self.gateway.clone();
        let events_tx = self.events_tx.clone();
        let node_id = node_id.to_string();
        self.runtime.spawn(async move {
            match gateway.list_expansion_events(&credential, &base_event).await {
                Ok(events) => {
                    let _ = events_tx.send(FlowEvent::ExpansionReady {
                        node_id: node_id.clone(),
                        events,
                    });
                }
                Err(err) if err.is_auth() => {
                    let _ = events_tx.send(FlowEvent::CredentialRejected {
                        origin: FlowOrigin::Expansion {
                            node_id: node_id.clone(),
                        },
                    });
                }
                Err(err) => {
                    tracing::warn!(%err, node = %node_id, "expansion flow failed");
                }
            }
            // The busy flag is cleared on every path.
            let _ = events_tx.send(FlowEvent::ExpansionSettled { node_id });
        });
        None
    }

    /// The view reports a node drag through here so the orchestrator stays
    /// the graph's only writer.
    pub fn handle_node_moved(
        &mut self,
        graph: &mut JourneyGraph,
        node_id: &str,
        position: (f32, f32),
    ) {
        graph.upsert_node_data(
            node_id,
            NodePatch {
                position: Some(position),
                ..Default::default()
            },
        );
    }

    /// Next flow completion, if any flow is still running.
    pub async fn recv_event(&mut self) -> Option<FlowEvent> {
        self.events_rx.recv().await
    }

    /// Applies every queued completion. Called once per UI frame.
    pub fn pump(&mut self, graph: &mut JourneyGraph) -> Vec<Notice> {
        let mut notices = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let Some(notice) = self.apply_event(graph, event) {
                notices.push(notice);
            }
        }
        notices
    }

    /// Applies one flow completion to the graph. This is the single place
    /// async results become state.
    pub fn apply_event(&mut self, graph: &mut JourneyGraph, event: FlowEvent) -> Option<Notice> {
        match event {
            FlowEvent::TimelineReady { events } => {
                graph.upsert_node_data(
                    ROOT_NODE_ID,
                    NodePatch {
                        status: Some(STATUS_TIMELINE_READY.to_string()),
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                if let Some((nodes, edges)) =
                    graph.subtree(ROOT_NODE_ID, &events, &LayoutPolicy::ring())
                {
                    graph.replace_all_except_root(nodes, edges);
                }
                self.in_flight.remove(ROOT_NODE_ID);
                None
            }
            FlowEvent::TimelineFailed => {
                graph.upsert_node_data(
                    ROOT_NODE_ID,
                    NodePatch {
                        title: Some(TITLE_UPLOAD_FAILED.to_string()),
                        status: Some(STATUS_UPLOAD_FAILED.to_string()),
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                self.in_flight.remove(ROOT_NODE_ID);
                None
            }
            FlowEvent::StageChanged { node_id, status } => {
                graph.upsert_node_data(
                    &node_id,
                    NodePatch {
                        status: Some(status),
                        ..Default::default()
                    },
                );
                None
            }
            FlowEvent::SceneReady { node_id, image } => {
                graph.upsert_node_data(
                    &node_id,
                    NodePatch {
                        image: Some(image),
                        status: Some(String::new()),
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                self.in_flight.remove(&node_id);
                None
            }
            FlowEvent::SceneFailed { node_id } => {
                graph.upsert_node_data(
                    &node_id,
                    NodePatch {
                        status: Some(STATUS_GENERATION_FAILED.to_string()),
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                self.in_flight.remove(&node_id);
                None
            }
            FlowEvent::ExpansionReady { node_id, events } => {
                graph.add_subtree(&node_id, &events, &LayoutPolicy::fan());
                None
            }
            FlowEvent::ExpansionSettled { node_id } => {
                graph.upsert_node_data(
                    &node_id,
                    NodePatch {
                        busy: Some(false),
                        ..Default::default()
                    },
                );
                self.in_flight.remove(&node_id);
                None
            }
            FlowEvent::CredentialRejected { origin } => {
                self.credentials.clear();
                match origin {
                    FlowOrigin::Upload => {
                        self.user_image = None;
                        graph.reset_root();
                        self.in_flight.remove(ROOT_NODE_ID);
                    }
                    FlowOrigin::Generation { node_id } => {
                        graph.upsert_node_data(
                            &node_id,
                            NodePatch {
                                status: Some(journey::EVENT_STATUS.to_string()),
                                busy: Some(false),
                                ..Default::default()
                            },
                        );
                        self.in_flight.remove(&node_id);
                    }
                    // The trailing settle event clears the busy flag.
                    FlowOrigin::Expansion { .. } => {}
                }
                Some(Notice::CredentialRequired {
                    message: Some(CREDENTIAL_REJECTED_MESSAGE.to_string()),
                })
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::journey::{EVENT_STATUS, ROOT_STATUS, ROOT_TITLE};
    use std::f32::consts::PI;
    use std::io::Write;
    use std::sync::Mutex;
    use timewalk_model_provider::SceneModel;

    // -- scripted model -----------------------------------------------------

    struct ScriptedModel {
        events: Mutex<Result<Vec<HistoricalEvent>, ProviderError>>,
        prompt: Mutex<Result<String, ProviderError>>,
        image: Mutex<Result<String, ProviderError>>,
    }

    impl ScriptedModel {
        fn new() -> Arc<Self> {
            Arc::new(ScriptedModel {
                events: Mutex::new(Ok(sample_events(7))),
                prompt: Mutex::new(Ok("a detailed scene".to_string())),
                image: Mutex::new(Ok("data:image/png;base64,QUJD".to_string())),
            })
        }

        fn script_events(&self, script: Result<Vec<HistoricalEvent>, ProviderError>) {
            *self.events.lock().expect("events script") = script;
        }

        fn script_image(&self, script: Result<String, ProviderError>) {
            *self.image.lock().expect("image script") = script;
        }
    }

    #[timewalk_types::async_trait]
    impl SceneModel for ScriptedModel {
        async fn list_events(
            &self,
            _credential: &str,
            _instruction: &str,
        ) -> Result<Vec<HistoricalEvent>, ProviderError> {
            self.events.lock().expect("events script").clone()
        }

        async fn refine_prompt(
            &self,
            _credential: &str,
            _instruction: &str,
        ) -> Result<String, ProviderError> {
            self.prompt.lock().expect("prompt script").clone()
        }

        async fn compose_image(
            &self,
            _credential: &str,
            _image: &UserImage,
            _instruction: &str,
        ) -> Result<String, ProviderError> {
            self.image.lock().expect("image script").clone()
        }
    }

    fn sample_events(count: usize) -> Vec<HistoricalEvent> {
        (0..count)
            .map(|index| HistoricalEvent {
                title: format!("Era {index}"),
                prompt: format!("Prompt {index}"),
            })
            .collect()
    }

    // -- harness ------------------------------------------------------------

    struct Harness {
        orchestrator: Orchestrator,
        graph: JourneyGraph,
        model: Arc<ScriptedModel>,
        dir: tempfile::TempDir,
    }

    fn harness_with(model: Arc<ScriptedModel>, with_credential: bool) -> Harness {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut credentials = ApiKeyStore::open(dir.path().join("credentials.json"));
        if with_credential {
            credentials.set("k-test");
        }
        let gateway = Arc::new(JourneyGateway::new(model.clone()));
        Harness {
            orchestrator: Orchestrator::new(gateway, credentials, Handle::current()),
            graph: JourneyGraph::new(),
            model,
            dir,
        }
    }

    fn selfie_path(harness: &Harness) -> std::path::PathBuf {
        let path = harness.dir.path().join("selfie.png");
        let mut file = std::fs::File::create(&path).expect("create selfie");
        file.write_all(b"not really a png").expect("write selfie");
        path
    }

    /// Drains and applies events until every flow has settled. Returns the
    /// notices raised and the number of events applied.
    async fn settle(harness: &mut Harness) -> (Vec<Notice>, usize) {
        let mut notices = Vec::new();
        let mut applied = 0;
        while harness.orchestrator.in_flight() > 0 {
            let event = harness
                .orchestrator
                .recv_event()
                .await
                .expect("event channel open");
            applied += 1;
            if let Some(notice) = harness.orchestrator.apply_event(&mut harness.graph, event) {
                notices.push(notice);
            }
        }
        (notices, applied)
    }

    async fn uploaded_harness(model: Arc<ScriptedModel>) -> Harness {
        let mut harness = harness_with(model, true);
        let path = selfie_path(&harness);
        assert!(
            harness
                .orchestrator
                .handle_upload(&mut harness.graph, &path)
                .is_none()
        );
        settle(&mut harness).await;
        harness
    }

    fn first_event_node_id(graph: &JourneyGraph) -> String {
        graph
            .nodes
            .iter()
            .find(|node| node.kind == NodeKind::Event)
            .expect("event node present")
            .id
            .clone()
    }

    // -- upload flow --------------------------------------------------------

    #[tokio::test]
    async fn test_upload_builds_first_ring() {
        let mut harness = harness_with(ScriptedModel::new(), true);
        let path = selfie_path(&harness);
        harness.orchestrator.handle_upload(&mut harness.graph, &path);

        let root = harness.graph.root();
        assert!(root.busy);
        assert_eq!(root.title, TITLE_READY_TO_TRAVEL);
        assert_eq!(root.status, STATUS_TIMELINE_LOADING);
        assert!(
            root.image
                .as_deref()
                .unwrap()
                .starts_with("data:image/png;base64,")
        );

        let (notices, _) = settle(&mut harness).await;
        assert!(notices.is_empty());

        let root = harness.graph.root();
        assert!(!root.busy);
        assert_eq!(root.status, STATUS_TIMELINE_READY);
        assert_eq!(harness.graph.nodes.len(), 8);
        assert_eq!(harness.graph.edges.len(), 7);
        assert!(harness.graph.is_forest());
        for node in harness
            .graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Event)
        {
            assert_eq!(node.status, EVENT_STATUS);
        }
    }

    #[tokio::test]
    async fn test_upload_with_three_events_uses_third_circle_steps() {
        let model = ScriptedModel::new();
        model.script_events(Ok(sample_events(3)));
        let harness = uploaded_harness(model).await;

        assert_eq!(harness.graph.nodes.len(), 4);
        let children: Vec<_> = harness
            .graph
            .nodes
            .iter()
            .filter(|n| n.kind == NodeKind::Event)
            .collect();
        let step = 2.0 * PI / 3.0;
        for (index, node) in children.iter().enumerate() {
            let angle = index as f32 * step;
            assert!((node.position.0 - 500.0 * angle.cos()).abs() < 1e-2);
            assert!((node.position.1 - 500.0 * angle.sin()).abs() < 1e-2);
        }
    }

    #[tokio::test]
    async fn test_upload_repeat_replaces_previous_ring() {
        let mut harness = uploaded_harness(ScriptedModel::new()).await;
        assert_eq!(harness.graph.nodes.len(), 8);

        harness.model.script_events(Ok(sample_events(3)));
        let path = selfie_path(&harness);
        harness.orchestrator.handle_upload(&mut harness.graph, &path);
        settle(&mut harness).await;

        assert_eq!(harness.graph.nodes.len(), 4);
        assert_eq!(harness.graph.edges.len(), 3);
        assert!(harness.graph.is_forest());
    }

    #[tokio::test]
    async fn test_upload_auth_failure_reverts_root_and_prompts() {
        let model = ScriptedModel::new();
        model.script_events(Err(ProviderError::Auth("400 API key not valid".into())));
        let mut harness = harness_with(model, true);
        let path = selfie_path(&harness);
        harness.orchestrator.handle_upload(&mut harness.graph, &path);

        let (notices, _) = settle(&mut harness).await;
        assert_eq!(
            notices,
            vec![Notice::CredentialRequired {
                message: Some(CREDENTIAL_REJECTED_MESSAGE.to_string())
            }]
        );
        assert!(!harness.orchestrator.has_credential());
        assert!(harness.orchestrator.user_image().is_none());

        let root = harness.graph.root();
        assert_eq!(root.title, ROOT_TITLE);
        assert_eq!(root.status, ROOT_STATUS);
        assert!(root.image.is_none());
        assert!(!root.busy);
        assert_eq!(harness.graph.nodes.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_without_credential_prompts_without_mutation() {
        let mut harness = harness_with(ScriptedModel::new(), false);
        let path = selfie_path(&harness);
        let notice = harness.orchestrator.handle_upload(&mut harness.graph, &path);
        assert_eq!(notice, Some(Notice::CredentialRequired { message: None }));
        assert_eq!(harness.graph.root().title, ROOT_TITLE);
        assert_eq!(harness.orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_upload_unreadable_file_marks_root_failed() {
        let mut harness = harness_with(ScriptedModel::new(), true);
        let missing = harness.dir.path().join("does-not-exist.png");
        harness
            .orchestrator
            .handle_upload(&mut harness.graph, &missing);
        let root = harness.graph.root();
        assert_eq!(root.title, TITLE_UPLOAD_FAILED);
        assert_eq!(root.status, STATUS_UPLOAD_FAILED);
        assert!(!root.busy);
        assert_eq!(harness.orchestrator.in_flight(), 0);
    }

    // -- generation flow ----------------------------------------------------

    #[tokio::test]
    async fn test_generation_walks_both_stages() {
        let mut harness = uploaded_harness(ScriptedModel::new()).await;
        let node_id = first_event_node_id(&harness.graph);

        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        let node = harness.graph.node(&node_id).unwrap();
        assert!(node.busy);
        assert_eq!(node.status, STATUS_CRAFTING_PROMPT);

        // First event is the stage change to the portal text.
        let event = harness.orchestrator.recv_event().await.unwrap();
        harness.orchestrator.apply_event(&mut harness.graph, event);
        assert_eq!(
            harness.graph.node(&node_id).unwrap().status,
            STATUS_ENTERING_PORTAL
        );

        let (notices, _) = settle(&mut harness).await;
        assert!(notices.is_empty());
        let node = harness.graph.node(&node_id).unwrap();
        assert!(!node.busy);
        assert_eq!(node.status, "");
        assert_eq!(node.image.as_deref(), Some("data:image/png;base64,QUJD"));
    }

    #[tokio::test]
    async fn test_generation_transient_failure_is_node_local() {
        let model = ScriptedModel::new();
        model.script_image(Err(ProviderError::Transient("503".into())));
        let mut harness = uploaded_harness(model).await;
        let node_id = first_event_node_id(&harness.graph);

        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        let (notices, _) = settle(&mut harness).await;
        assert!(notices.is_empty());
        let node = harness.graph.node(&node_id).unwrap();
        assert!(!node.busy);
        assert!(node.image.is_none());
        assert_eq!(node.status, STATUS_GENERATION_FAILED);
        assert!(harness.orchestrator.has_credential());
    }

    #[tokio::test]
    async fn test_generation_invalid_key_purges_credential() {
        let model = ScriptedModel::new();
        model.script_image(Err(ProviderError::Auth("400 API key not valid".into())));
        let mut harness = uploaded_harness(model).await;
        let node_id = first_event_node_id(&harness.graph);

        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        let (notices, _) = settle(&mut harness).await;

        assert_eq!(
            notices,
            vec![Notice::CredentialRequired {
                message: Some(CREDENTIAL_REJECTED_MESSAGE.to_string())
            }]
        );
        assert!(!harness.orchestrator.has_credential());
        let node = harness.graph.node(&node_id).unwrap();
        assert!(!node.busy);
        assert!(node.image.is_none());
        assert_eq!(node.status, EVENT_STATUS);
    }

    #[tokio::test]
    async fn test_generation_without_selfie_aborts_silently() {
        let mut harness = harness_with(ScriptedModel::new(), true);
        harness
            .graph
            .add_subtree(ROOT_NODE_ID, &sample_events(1), &LayoutPolicy::ring());
        let node_id = first_event_node_id(&harness.graph);
        let notice = harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        assert!(notice.is_none());
        assert!(!harness.graph.node(&node_id).unwrap().busy);
        assert_eq!(harness.orchestrator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_generation_without_credential_prompts_without_mutation() {
        let mut harness = uploaded_harness(ScriptedModel::new()).await;
        let node_id = first_event_node_id(&harness.graph);
        harness.orchestrator.credentials.clear();

        let notice = harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        assert_eq!(notice, Some(Notice::CredentialRequired { message: None }));
        assert!(!harness.graph.node(&node_id).unwrap().busy);
    }

    #[tokio::test]
    async fn test_second_generation_request_is_structurally_rejected() {
        let mut harness = uploaded_harness(ScriptedModel::new()).await;
        let node_id = first_event_node_id(&harness.graph);

        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        assert_eq!(harness.orchestrator.in_flight(), 1);
        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        assert_eq!(harness.orchestrator.in_flight(), 1);

        // Exactly one flow ran: one stage change plus one completion.
        let (_, applied) = settle(&mut harness).await;
        assert_eq!(applied, 2);
    }

    // -- expansion flow -----------------------------------------------------

    async fn harness_with_generated_node(model: Arc<ScriptedModel>) -> (Harness, String) {
        let mut harness = uploaded_harness(model).await;
        let node_id = first_event_node_id(&harness.graph);
        harness
            .orchestrator
            .handle_generate(&mut harness.graph, &node_id);
        settle(&mut harness).await;
        assert!(harness.graph.node(&node_id).unwrap().image.is_some());
        (harness, node_id)
    }

    #[tokio::test]
    async fn test_expansion_fans_out_children() {
        let (mut harness, node_id) = harness_with_generated_node(ScriptedModel::new()).await;
        harness.model.script_events(Ok(sample_events(3)));

        let before = harness.graph.nodes.len();
        harness
            .orchestrator
            .handle_expand(&mut harness.graph, &node_id);
        assert!(harness.graph.node(&node_id).unwrap().busy);

        let (notices, _) = settle(&mut harness).await;
        assert!(notices.is_empty());
        assert_eq!(harness.graph.nodes.len(), before + 3);
        assert!(!harness.graph.node(&node_id).unwrap().busy);
        assert!(harness.graph.is_forest());
        let children: Vec<_> = harness
            .graph
            .edges
            .iter()
            .filter(|edge| edge.source == node_id)
            .collect();
        assert_eq!(children.len(), 3);
    }

    #[tokio::test]
    async fn test_expansion_transient_failure_adds_nothing_but_settles() {
        let (mut harness, node_id) = harness_with_generated_node(ScriptedModel::new()).await;
        harness
            .model
            .script_events(Err(ProviderError::Transient("boom".into())));

        let before = harness.graph.nodes.len();
        harness
            .orchestrator
            .handle_expand(&mut harness.graph, &node_id);
        let (notices, _) = settle(&mut harness).await;

        assert!(notices.is_empty());
        assert_eq!(harness.graph.nodes.len(), before);
        assert!(!harness.graph.node(&node_id).unwrap().busy);
    }

    #[tokio::test]
    async fn test_expansion_auth_failure_purges_credential_and_settles() {
        let (mut harness, node_id) = harness_with_generated_node(ScriptedModel::new()).await;
        harness
            .model
            .script_events(Err(ProviderError::Auth("400".into())));

        harness
            .orchestrator
            .handle_expand(&mut harness.graph, &node_id);
        let (notices, _) = settle(&mut harness).await;

        assert_eq!(
            notices,
            vec![Notice::CredentialRequired {
                message: Some(CREDENTIAL_REJECTED_MESSAGE.to_string())
            }]
        );
        assert!(!harness.orchestrator.has_credential());
        assert!(!harness.graph.node(&node_id).unwrap().busy);
        assert!(harness.graph.is_forest());
    }
}
