/// End-to-end integration tests for the planrag pipeline.
///
/// Tests the complete flow:
///   Loader → Chunker → Embedder → Index → Retriever → Prompt → Generator → Plan files
use chrono::NaiveDate;
use planrag::chunker;
use planrag::db::{IndexError, IndexStore};
use planrag::embedder::Embedder;
use planrag::embedder::hashing::HashingEmbedder;
use planrag::formatter::{self, ExportFormat};
use planrag::generator::{GenerationError, Generator};
use planrag::indexer::{BuildOptions, BuildStatus, IndexBuilder};
use planrag::loader::{DocumentRecord, SourceType};
use planrag::plan::{PlanGenerator, PlanSettings, PlanStore, TestPlanRequest};
use planrag::retriever::{RetrievalError, Retriever};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const REQUIREMENTS: &str = "\
# Checkout

The cart page lists every item with its quantity and unit price. Users can \
change quantities inline; a quantity of zero removes the item.

Payment accepts credit cards and gift cards. A declined card shows an error \
banner and keeps the cart intact.

Orders above 100 EUR ship for free. Shipping is otherwise a flat 5 EUR fee, \
shown before the payment step.
";

fn options(chunk_size: usize, chunk_overlap: usize) -> BuildOptions {
    BuildOptions {
        chunk_size,
        chunk_overlap,
        workers: 2,
        batch_size: 4,
    }
}

fn write_project(root: &Path, project: &str, files: &[(&str, &str)]) {
    let dir = root.join(project);
    fs::create_dir_all(&dir).unwrap();
    for (name, body) in files {
        fs::write(dir.join(name), body).unwrap();
    }
}

fn doc(text: &str) -> DocumentRecord {
    DocumentRecord {
        text: text.to_string(),
        source_path: "input/shop/checkout.md".into(),
        source_type: SourceType::Md,
        project: "shop".into(),
        page: None,
    }
}

/// Returns a fixed markdown table for every prompt.
struct TableGenerator;

impl Generator for TableGenerator {
    fn generate(&self, _prompt: &str, _model_id: &str) -> Result<String, GenerationError> {
        Ok("# Plan\n\n| Test Item | Expected Result |\n|---|---|\n| Pay | Receipt |\n".into())
    }
}

/// Property 1: chunks minus overlaps reconstruct the document.
#[test]
fn test_chunk_coverage() {
    for (size, overlap) in [(500, 100), (60, 10), (40, 39), (7, 0)] {
        let chunks = chunker::split(&[doc(REQUIREMENTS)], size, overlap).unwrap();
        let mut rebuilt: String = chunks[0].text.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.text.chars().skip(overlap));
        }
        assert_eq!(rebuilt, REQUIREMENTS, "size={size} overlap={overlap}");
    }
}

/// Property 2: adjacent chunks share exactly `chunk_overlap` chars.
#[test]
fn test_overlap_invariant() {
    let overlap = 15;
    let chunks = chunker::split(&[doc(REQUIREMENTS)], 80, overlap).unwrap();
    assert!(chunks.len() > 3);
    for pair in chunks.windows(2) {
        let tail: String = {
            let chars: Vec<char> = pair[0].text.chars().collect();
            chars[chars.len() - overlap..].iter().collect()
        };
        let head: String = pair[1].text.chars().take(overlap).collect();
        assert_eq!(tail, head);
        assert!(pair[0].text.chars().count() <= 80);
    }
}

/// Property 3: building twice from the same input gives the same results.
#[test]
fn test_rebuild_idempotence() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input");
    write_project(&input, "shop", &[("checkout.md", REQUIREMENTS)]);
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(128);
    let builder = IndexBuilder::new(&store, &embedder, options(120, 20)).unwrap();
    let retriever = Retriever::new(&store, &embedder);

    let snapshot = || {
        retriever
            .retrieve("shop", "declined credit card error", 100)
            .unwrap()
            .into_iter()
            .map(|h| (h.chunk.text, h.score))
            .collect::<Vec<_>>()
    };

    builder.build_project_dir("shop", input.join("shop")).unwrap();
    let first = snapshot();
    builder.build_project_dir("shop", input.join("shop")).unwrap();
    let second = snapshot();

    assert_eq!(first.len(), second.len());
    for ((t1, s1), (t2, s2)) in first.iter().zip(&second) {
        assert_eq!(t1, t2);
        assert!((s1 - s2).abs() < 1e-6);
    }
}

/// Property 4: rebuilding project A leaves project B alone.
#[test]
fn test_project_isolation() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input");
    write_project(&input, "alpha", &[("a.txt", "Alpha login flow with SSO.")]);
    write_project(&input, "beta", &[("b.txt", "Beta reporting dashboard exports PDF.")]);
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(64);
    let builder = IndexBuilder::new(&store, &embedder, options(500, 100)).unwrap();

    builder.build_all(&input).unwrap();
    let beta_db = store.index_path("beta");
    let before = fs::metadata(&beta_db).unwrap();
    let beta_bytes = fs::read(&beta_db).unwrap();

    fs::write(input.join("alpha").join("a.txt"), "Alpha now uses passkeys.").unwrap();
    builder.build_project_dir("alpha", input.join("alpha")).unwrap();

    let after = fs::metadata(&beta_db).unwrap();
    assert_eq!(before.modified().unwrap(), after.modified().unwrap());
    assert_eq!(fs::read(&beta_db).unwrap(), beta_bytes);

    let hits = Retriever::new(&store, &embedder)
        .retrieve("beta", "reporting", 5)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, "Beta reporting dashboard exports PDF.");
}

/// Property 5: scores never increase; k beyond the size returns everything.
#[test]
fn test_retrieval_ordering() {
    let dir = tempdir().unwrap();
    let store = IndexStore::new(dir.path());
    let embedder = HashingEmbedder::new(64);
    let builder = IndexBuilder::new(&store, &embedder, options(60, 10)).unwrap();
    let report = builder.build("shop", &[doc(REQUIREMENTS)]).unwrap();

    let hits = Retriever::new(&store, &embedder)
        .retrieve("shop", "free shipping above 100 EUR", report.chunks + 10)
        .unwrap();
    assert_eq!(hits.len(), report.chunks);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

/// Property 6: a missing index is an error, not an empty result.
#[test]
fn test_missing_index() {
    let dir = tempdir().unwrap();
    let store = IndexStore::new(dir.path());
    let embedder = HashingEmbedder::new(64);
    let err = Retriever::new(&store, &embedder)
        .retrieve("nonexistent_project", "anything", 5)
        .unwrap_err();
    assert!(matches!(
        err,
        RetrievalError::Index(IndexError::NotFound { .. })
    ));
}

/// Property 7: one small text file becomes one retrievable chunk.
#[test]
fn test_end_to_end_single_chunk() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input");
    let text = "API returns 200 on success, 404 on missing resource.";
    write_project(&input, "api", &[("spec.txt", text)]);
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(384);

    let outcomes = IndexBuilder::new(&store, &embedder, options(500, 100))
        .unwrap()
        .build_all(&input)
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    let (name, report) = &outcomes[0];
    let report = report.as_ref().unwrap();
    assert_eq!(name, "api");
    assert_eq!(report.status, BuildStatus::Built);
    assert_eq!(report.chunks, 1);
    assert_eq!(report.loaded_files, 1);

    let hits = Retriever::new(&store, &embedder)
        .retrieve("api", "What does the API return on success?", 1)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].chunk.text, text);
    assert!(hits[0].score > 0.0);
    assert_eq!(hits[0].chunk.source_type, SourceType::Txt);
}

/// Property 8: same-day plans get consecutive serials.
#[test]
fn test_serial_filenames() {
    let dir = tempdir().unwrap();
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(64);
    let mut record = doc("Login accepts email and password.");
    record.project = "P".into();
    IndexBuilder::new(&store, &embedder, options(500, 100))
        .unwrap()
        .build("P", &[record])
        .unwrap();

    let plans = PlanGenerator::new(
        Retriever::new(&store, &embedder),
        &TableGenerator,
        PlanStore::new(dir.path().join("output")),
        PlanSettings::default(),
    );
    let request = TestPlanRequest {
        project: "P".into(),
        module: "M".into(),
        query: "login".into(),
    };
    let date = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();

    let first = plans.generate_on(&request, date).unwrap();
    let second = plans.generate_on(&request, date).unwrap();

    let module_dir = dir.path().join("output").join("P").join("M");
    assert_eq!(first.path, module_dir.join("P_M_20250630_0001.md"));
    assert_eq!(second.path, module_dir.join("P_M_20250630_0002.md"));
    assert_eq!((first.serial, second.serial), (1, 2));
}

/// Loader failures are isolated and the rest of the project still builds.
#[test]
fn test_bad_files_do_not_abort_build() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input");
    write_project(
        &input,
        "mixed",
        &[
            ("good.md", "# Search\n\nSearch returns at most 50 results."),
            ("broken.pdf", "not really a pdf"),
            ("screen.png", "binary"),
            ("notes.csv", "a,b"),
            ("config.yaml", "search:\n  limit: 50\n"),
        ],
    );
    fs::write(input.join("mixed").join("latin1.txt"), [0xff, 0xfe, 0x41]).unwrap();

    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(64);
    let report = IndexBuilder::new(&store, &embedder, options(500, 100))
        .unwrap()
        .build_project_dir("mixed", input.join("mixed"))
        .unwrap();

    assert_eq!(report.status, BuildStatus::Built);
    assert_eq!(report.loaded_files, 2);
    assert_eq!(report.failed_files, 2);
    assert_eq!(report.skipped_files, 2);

    let hits = Retriever::new(&store, &embedder)
        .retrieve("mixed", "search limit", 10)
        .unwrap();
    assert!(hits.iter().any(|h| h.chunk.text.contains("search.limit: 50")));
}

/// An empty project keeps its previous index and reports a no-op.
#[test]
fn test_empty_project_keeps_previous_index() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("input");
    write_project(&input, "docs", &[("a.md", "Original requirement text.")]);
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(64);
    let builder = IndexBuilder::new(&store, &embedder, options(500, 100)).unwrap();
    builder.build_project_dir("docs", input.join("docs")).unwrap();

    fs::write(input.join("docs").join("a.md"), "   \n").unwrap();
    let report = builder.build_project_dir("docs", input.join("docs")).unwrap();
    assert_eq!(report.status, BuildStatus::Empty);

    let hits = Retriever::new(&store, &embedder)
        .retrieve("docs", "requirement", 1)
        .unwrap();
    assert_eq!(hits[0].chunk.text, "Original requirement text.");
}

/// Generated markdown exports to every office format without changing.
#[test]
fn test_generate_then_export() {
    let dir = tempdir().unwrap();
    let store = IndexStore::new(dir.path().join("vector_db"));
    let embedder = HashingEmbedder::new(64);
    let mut record = doc(REQUIREMENTS);
    record.project = "shop".into();
    IndexBuilder::new(&store, &embedder, options(500, 100))
        .unwrap()
        .build("shop", &[record])
        .unwrap();

    let plans = PlanGenerator::new(
        Retriever::new(&store, &embedder),
        &TableGenerator,
        PlanStore::new(dir.path().join("output")),
        PlanSettings::default(),
    );
    let plan = plans
        .generate(&TestPlanRequest {
            project: "shop".into(),
            module: "checkout".into(),
            query: "payment".into(),
        })
        .unwrap();
    let markdown = fs::read_to_string(&plan.path).unwrap();
    assert_eq!(markdown, plan.markdown_text);

    let written = formatter::export_all(&plan.path, &ExportFormat::ALL).unwrap();
    assert_eq!(written.len(), 3);
    for (path, format) in written.iter().zip(ExportFormat::ALL) {
        assert_eq!(path.extension().unwrap(), format.extension());
        assert!(path.exists());
    }
    assert_eq!(fs::read_to_string(&plan.path).unwrap(), markdown);

    // Query embedding is deterministic for a fixed model.
    assert_eq!(
        embedder.embed("payment").unwrap(),
        embedder.embed("payment").unwrap()
    );
}
