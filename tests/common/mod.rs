#![allow(dead_code)]

use async_trait::async_trait;
use docqa::generation::{GenerationClient, GenerationError, PromptPart};
use docqa::images::ImageCache;
use docqa::processing::{
    DocumentService, IngestionObserver, IngestionStage, chunking::TextChunker,
};
use docqa::qdrant::QdrantError;
use docqa::store::{CollectionHandle, QueryMatch, StoreError, VectorStore};
use docx_rs::{Docx, Paragraph, Run};
use flate2::{Compression, write::ZlibEncoder};
use lopdf::{
    Dictionary, Document, Object, Stream,
    content::{Content, Operation},
    dictionary,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};

/// One recorded `add` call.
#[derive(Clone, Debug)]
pub struct AddCall {
    pub collection: String,
    pub documents: Vec<String>,
    pub metadatas: Vec<Map<String, Value>>,
    pub ids: Vec<String>,
}

#[derive(Clone, Debug)]
struct StoredChunk {
    id: String,
    document: String,
    metadata: Map<String, Value>,
}

#[derive(Default)]
struct Outages {
    adds_after: Option<usize>,
    queries: bool,
}

/// Vector store held in memory, ranking by shared lowercase words.
#[derive(Default)]
pub struct InMemoryStore {
    collections: Mutex<BTreeMap<String, Vec<StoredChunk>>>,
    adds: Mutex<Vec<AddCall>>,
    queries: Mutex<Vec<Vec<QueryMatch>>>,
    outages: Mutex<Outages>,
}

/// Error returned while an outage is switched on.
pub fn store_outage() -> StoreError {
    StoreError::Qdrant(QdrantError::UnexpectedStatus {
        status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        body: "store offline".into(),
    })
}

impl InMemoryStore {
    /// Let `successful` `add` calls through, then fail every later one.
    pub fn fail_adds_after(&self, successful: usize) {
        self.outages.lock().unwrap().adds_after = Some(successful);
    }

    /// Fail every `query` call.
    pub fn fail_queries(&self) {
        self.outages.lock().unwrap().queries = true;
    }

    pub fn add_calls(&self) -> Vec<AddCall> {
        self.adds.lock().unwrap().clone()
    }

    pub fn last_query(&self) -> Option<Vec<QueryMatch>> {
        self.queries.lock().unwrap().last().cloned()
    }

    pub fn chunk_count(&self, collection: &str) -> usize {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .map_or(0, Vec::len)
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn get_or_create(&self, name: &str) -> Result<CollectionHandle, StoreError> {
        self.collections
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(CollectionHandle::new(name))
    }

    async fn add(
        &self,
        collection: &CollectionHandle,
        documents: Vec<String>,
        metadatas: Vec<Map<String, Value>>,
        ids: Vec<String>,
    ) -> Result<(), StoreError> {
        if documents.len() != metadatas.len() || documents.len() != ids.len() {
            return Err(StoreError::LengthMismatch {
                documents: documents.len(),
                metadatas: metadatas.len(),
                ids: ids.len(),
            });
        }
        let limit = self.outages.lock().unwrap().adds_after;
        if limit.is_some_and(|limit| self.adds.lock().unwrap().len() >= limit) {
            return Err(store_outage());
        }
        self.adds.lock().unwrap().push(AddCall {
            collection: collection.name().to_string(),
            documents: documents.clone(),
            metadatas: metadatas.clone(),
            ids: ids.clone(),
        });

        let mut collections = self.collections.lock().unwrap();
        let chunks = collections.entry(collection.name().to_string()).or_default();
        for ((document, metadata), id) in documents.into_iter().zip(metadatas).zip(ids) {
            chunks.retain(|chunk| chunk.id != id);
            chunks.push(StoredChunk {
                id,
                document,
                metadata,
            });
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        query_texts: Vec<String>,
        n_results: usize,
    ) -> Result<Vec<Vec<QueryMatch>>, StoreError> {
        if self.outages.lock().unwrap().queries {
            return Err(store_outage());
        }
        let collections = self.collections.lock().unwrap();
        let chunks = collections
            .get(collection.name())
            .cloned()
            .unwrap_or_default();
        drop(collections);

        let results: Vec<Vec<QueryMatch>> = query_texts
            .iter()
            .map(|query| {
                let query_words = words(query);
                let mut scored: Vec<QueryMatch> = chunks
                    .iter()
                    .map(|chunk| QueryMatch {
                        id: chunk.id.clone(),
                        document: chunk.document.clone(),
                        metadata: chunk.metadata.clone(),
                        score: words(&chunk.document).intersection(&query_words).count() as f32,
                    })
                    .collect();
                scored.sort_by(|a, b| b.score.total_cmp(&a.score));
                scored.truncate(n_results);
                scored
            })
            .collect();

        if let Some(first) = results.first() {
            self.queries.lock().unwrap().push(first.clone());
        }
        Ok(results)
    }

    async fn list(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.lock().unwrap().keys().cloned().collect())
    }

    async fn exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.collections.lock().unwrap().contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.collections.lock().unwrap().remove(name);
        Ok(())
    }
}

/// Canned behaviour of [`ScriptedGenerator`].
#[derive(Clone)]
pub enum Script {
    Reply(String),
    Empty,
    Fail,
}

/// Generation client returning a fixed reply and recording every prompt.
pub struct ScriptedGenerator {
    script: Script,
    prompts: Mutex<Vec<Vec<PromptPart>>>,
}

impl ScriptedGenerator {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::new(Script::Reply(text.to_string()))
    }

    pub fn prompts(&self) -> Vec<Vec<PromptPart>> {
        self.prompts.lock().unwrap().clone()
    }

    /// Concatenated text parts of the most recent prompt.
    pub fn last_prompt_text(&self) -> String {
        self.prompts()
            .last()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| match part {
                        PromptPart::Text(text) => Some(text.as_str()),
                        PromptPart::Image(_) => None,
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }

    pub fn last_prompt_image_count(&self) -> usize {
        self.prompts()
            .last()
            .map(|parts| {
                parts
                    .iter()
                    .filter(|part| matches!(part, PromptPart::Image(_)))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[async_trait]
impl GenerationClient for ScriptedGenerator {
    async fn generate(&self, parts: Vec<PromptPart>) -> Result<Option<String>, GenerationError> {
        self.prompts.lock().unwrap().push(parts);
        match &self.script {
            Script::Reply(text) => Ok(Some(text.clone())),
            Script::Empty => Ok(None),
            Script::Fail => Err(GenerationError::ImageEncoding("scripted failure".into())),
        }
    }
}

/// Observer keeping every progress update.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(IngestionStage, u8, String)>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<(IngestionStage, u8, String)> {
        self.events.lock().unwrap().clone()
    }

    pub fn stages(&self) -> Vec<IngestionStage> {
        self.events().into_iter().map(|(stage, _, _)| stage).collect()
    }
}

impl IngestionObserver for RecordingObserver {
    fn on_progress(&self, stage: IngestionStage, progress: u8, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push((stage, progress, message.to_string()));
    }
}

/// Service, store, and generator wired together for a test.
pub struct Harness {
    pub service: Arc<DocumentService>,
    pub store: Arc<InMemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_chunker(generator, TextChunker::new(1000, 200).unwrap())
    }

    pub fn with_chunker(generator: ScriptedGenerator, chunker: TextChunker) -> Self {
        let store = Arc::new(InMemoryStore::default());
        let generator = Arc::new(generator);
        let service = Arc::new(DocumentService::from_parts(
            store.clone(),
            generator.clone(),
            ImageCache::new(16),
            chunker,
            "rag-collection",
        ));
        Self {
            service,
            store,
            generator,
        }
    }
}

/// One page of a generated PDF: its text and the images drawn on it.
pub struct PdfPage<'a> {
    pub text: &'a str,
    pub images: &'a [FixtureImage],
}

/// Image XObject written into a generated PDF. Every variant but `Rgb` fails to decode.
#[derive(Clone, Copy, Debug)]
pub enum FixtureImage {
    /// Uncompressed DeviceRGB pixels of the given size.
    Rgb(u32, u32),
    /// DeviceRGB with only half of the declared pixel bytes.
    Truncated(u32, u32),
    /// Stream encoded with a filter the extractor does not decode.
    UnsupportedFilter(u32, u32),
    /// `FlateDecode` stream whose bytes are not zlib data.
    CorruptFlate(u32, u32),
    /// `FlateDecode` stream inflating far beyond the declared dimensions.
    FlateBomb(u32, u32),
}

impl FixtureImage {
    fn size(self) -> (u32, u32) {
        match self {
            Self::Rgb(w, h)
            | Self::Truncated(w, h)
            | Self::UnsupportedFilter(w, h)
            | Self::CorruptFlate(w, h)
            | Self::FlateBomb(w, h) => (w, h),
        }
    }

    fn stream(self) -> Stream {
        let (width, height) = self.size();
        let pixel_bytes = (width * height * 3) as usize;
        let (filter, content): (Option<&str>, Vec<u8>) = match self {
            Self::Rgb(..) => (None, vec![180u8; pixel_bytes]),
            Self::Truncated(..) => (None, vec![180u8; pixel_bytes / 2]),
            Self::UnsupportedFilter(..) => (Some("JBIG2Decode"), vec![0u8; 64]),
            Self::CorruptFlate(..) => (Some("FlateDecode"), b"definitely not zlib".to_vec()),
            Self::FlateBomb(..) => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
                encoder.write_all(&vec![0u8; 8 * 1024 * 1024]).unwrap();
                (Some("FlateDecode"), encoder.finish().unwrap())
            }
        };
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        Stream::new(dict, content).with_compression(false)
    }
}

/// Build a PDF whose pages carry Courier text and DeviceRGB image XObjects.
pub fn build_pdf(pages: &[PdfPage<'_>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    for page in pages {
        let mut operations = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(page.text)]),
            Operation::new("ET", vec![]),
        ];

        let mut xobjects = Dictionary::new();
        for (index, fixture) in page.images.iter().enumerate() {
            let (width, height) = fixture.size();
            let image_id = doc.add_object(fixture.stream());
            let name = format!("Im{index}");
            xobjects.set(name.as_bytes().to_vec(), image_id);
            operations.extend([
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        i64::from(width).into(),
                        0.into(),
                        0.into(),
                        i64::from(height).into(),
                        100.into(),
                        100.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(name.into_bytes())]),
                Operation::new("Q", vec![]),
            ]);
        }

        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode content"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Resources" => dictionary! {
                "Font" => dictionary! { "F1" => font_id },
                "XObject" => xobjects,
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

/// Build a DOCX with one paragraph per entry.
pub fn build_docx(paragraphs: &[&str]) -> Vec<u8> {
    let mut docx = Docx::new();
    for text in paragraphs {
        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_text(*text)));
    }
    let mut cursor = Cursor::new(Vec::new());
    docx.build().pack(&mut cursor).expect("pack docx");
    cursor.into_inner()
}
