#![allow(dead_code)]

use std::{
    collections::HashMap,
    io::{Cursor, Write},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use sheetpress::{
    application::{
        render::{
            DocumentBuilder, EngineError, OrchestratorConfig, PageOptions, ReadyReport,
            RenderDocument, RenderEngine, RenderEnvironment, RenderOrchestrator,
        },
        score::{ScoreRenderService, ScoreRenderer},
        storage::{ObjectStore, StoreError},
    },
    infra::http::{HttpState, build_router},
};
use zip::{ZipWriter, write::SimpleFileOptions};

pub const FAKE_PDF: &[u8] = b"%PDF-1.7\n% fake render\n%%EOF";

#[derive(Default)]
pub struct MemoryStore {
    objects: HashMap<String, Bytes>,
    calls: AtomicUsize,
    requested: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn with(objects: &[(&str, Bytes)]) -> Arc<Self> {
        Arc::new(Self {
            objects: objects
                .iter()
                .map(|(key, bytes)| (key.to_string(), bytes.clone()))
                .collect(),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<(String, String)> {
        self.requested.lock().expect("requested lock").clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Bytes, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .expect("requested lock")
            .push((bucket.to_string(), key.to_string()));
        self.objects
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(bucket, key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Ready,
    NeverReady,
    TransposeFails,
}

/// Engine whose environments report according to `behaviour` and return [`FAKE_PDF`].
#[derive(Clone)]
pub struct FakeEngine {
    behaviour: Behaviour,
    launches: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    documents: Arc<Mutex<Vec<String>>>,
}

impl FakeEngine {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            launches: Arc::new(AtomicUsize::new(0)),
            closes: Arc::new(AtomicUsize::new(0)),
            documents: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> Vec<String> {
        self.documents.lock().expect("documents lock").clone()
    }
}

struct FakeEnvironment {
    engine: FakeEngine,
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn launch(&self) -> Result<Box<dyn RenderEnvironment>, EngineError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeEnvironment {
            engine: self.clone(),
        }))
    }
}

#[async_trait]
impl RenderEnvironment for FakeEnvironment {
    async fn load(&mut self, document: &RenderDocument) -> Result<(), EngineError> {
        self.engine
            .documents
            .lock()
            .expect("documents lock")
            .push(document.html().to_string());
        Ok(())
    }

    async fn poll_ready(&mut self) -> Result<Option<ReadyReport>, EngineError> {
        Ok(match self.engine.behaviour {
            Behaviour::Ready => Some(ReadyReport::default()),
            Behaviour::NeverReady => None,
            Behaviour::TransposeFails => Some(ReadyReport {
                transpose_error: Some("TransposeCalculator is not a constructor".to_string()),
                failed: None,
            }),
        })
    }

    async fn capture_pdf(&mut self, _options: &PageOptions) -> Result<Bytes, EngineError> {
        Ok(Bytes::from_static(FAKE_PDF))
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.engine.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn router(store: Arc<MemoryStore>, engine: FakeEngine, bucket: Option<&str>) -> Router {
    let orchestrator = RenderOrchestrator::new(
        Arc::new(engine),
        OrchestratorConfig {
            ready_timeout: Duration::from_millis(100),
            poll_interval: Duration::from_millis(5),
            page: PageOptions::letter(),
        },
    );
    let renderer = ScoreRenderer::new(DocumentBuilder::default(), orchestrator);
    let scores = Arc::new(ScoreRenderService::new(
        store,
        bucket.map(str::to_string),
        renderer,
    ));
    build_router(HttpState { scores })
}

pub fn mxl(entries: &[(&str, &str)]) -> Bytes {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start entry");
        writer.write_all(contents.as_bytes()).expect("write entry");
    }
    Bytes::from(writer.finish().expect("finish archive").into_inner())
}

pub const SCORE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="4.0"><part-list><score-part id="P1"><part-name>Piano</part-name></score-part></part-list><part id="P1"><measure number="1"><note><pitch><step>C</step><octave>4</octave></pitch><duration>4</duration><type>whole</type></note></measure></part></score-partwise>"#;
