#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]

use pokedb_core::{
    CanonicalSource, Collector, CompositeProvider, FetchCache, Generation, HttpFetcher,
    OutputStorage, PastValuesProvider, ResourceKind, RetryPolicy, ScrapedChangeLogProvider,
};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const API: &str = "/api/v2";

struct Api {
    server: MockServer,
}

impl Api {
    async fn start() -> Self {
        let api = Self {
            server: MockServer::start().await,
        };
        api.serve(
            "generation/",
            json!({"count": 2, "results": [api.generation(1), api.generation(2)]}),
        )
        .await;
        api.serve(
            "generation/1/",
            json!({
                "id": 1,
                "name": "generation-i",
                "version_groups": [api.named("red-blue", "version-group/1/")],
                "abilities": [],
                "pokemon_species": [api.named("clefairy", "pokemon-species/35/")],
                "moves": [
                    api.named("tackle", "move/33/"),
                    api.named("pound", "move/1/"),
                    api.named("vanished", "move/90/"),
                    api.named("sketch", "move/166/")
                ]
            }),
        )
        .await;
        api.serve(
            "generation/2/",
            json!({
                "id": 2,
                "name": "generation-ii",
                "version_groups": [api.named("gold-silver", "version-group/3/")],
                "abilities": [],
                "pokemon_species": [],
                "moves": [api.named("sketch", "move/166/")]
            }),
        )
        .await;
        api.serve(
            "version-group/red-blue/",
            json!({"name": "red-blue", "versions": [{"name": "red"}, {"name": "blue"}]}),
        )
        .await;
        api.serve(
            "version-group/gold-silver/",
            json!({"name": "gold-silver", "versions": [{"name": "gold"}, {"name": "silver"}]}),
        )
        .await;
        api.serve("move/1/", api.move_doc(1, "pound", 40, 1, &[])).await;
        api.serve(
            "move/33/",
            api.move_doc(
                33,
                "tackle",
                40,
                1,
                &[json!({
                    "power": 35,
                    "accuracy": 95,
                    "version_group": api.named("gold-silver", "version-group/3/")
                })],
            ),
        )
        .await;
        api.serve("move/166/", api.move_doc(166, "sketch", 0, 2, &[])).await;
        api.serve(
            "pokemon-species/35/",
            json!({
                "id": 35,
                "name": "clefairy",
                "generation": api.generation(1),
                "varieties": [{"is_default": true, "pokemon": api.named("clefairy", "pokemon/35/")}],
                "capture_rate": 150,
                "egg_groups": [{"name": "fairy"}],
                "genera": [{"genus": "Fairy Pokémon", "language": {"name": "en"}}],
                "pokedex_numbers": [{"entry_number": 35, "pokedex": {"name": "national"}}]
            }),
        )
        .await;
        api.serve(
            "pokemon/35/",
            json!({
                "id": 35,
                "name": "clefairy",
                "base_experience": 113,
                "height": 6,
                "weight": 75,
                "types": [{"slot": 1, "type": {"name": "fairy"}}],
                "past_types": [{
                    "generation": api.generation(1),
                    "types": [{"slot": 1, "type": {"name": "normal"}}]
                }],
                "abilities": [
                    {"ability": {"name": "cute-charm"}, "is_hidden": false, "slot": 1},
                    {"ability": {"name": "friend-guard"}, "is_hidden": true, "slot": 3}
                ],
                "stats": [
                    {"base_stat": 70, "effort": 2, "stat": {"name": "hp"}},
                    {"base_stat": 60, "effort": 0, "stat": {"name": "special-attack"}},
                    {"base_stat": 65, "effort": 0, "stat": {"name": "special-defense"}}
                ],
                "sprites": {"front_default": "https://img.test/35.png", "versions": {}},
                "forms": [],
                "held_items": [],
                "moves": []
            }),
        )
        .await;
        api
    }

    fn url(&self, relative: &str) -> String {
        format!("{}{API}/{relative}", self.server.uri())
    }

    fn named(&self, name: &str, relative: &str) -> Value {
        json!({"name": name, "url": self.url(relative)})
    }

    fn generation(&self, n: u32) -> Value {
        self.named(&format!("generation-{n}"), &format!("generation/{n}/"))
    }

    fn move_doc(&self, id: u32, name: &str, power: u32, generation: u32, past: &[Value]) -> Value {
        json!({
            "id": id,
            "name": name,
            "accuracy": 100,
            "power": power,
            "pp": 35,
            "priority": 0,
            "damage_class": {"name": "physical"},
            "type": {"name": "normal"},
            "target": {"name": "selected-pokemon"},
            "effect_entries": [{
                "effect": "Inflicts regular damage.",
                "short_effect": "Inflicts regular damage.",
                "language": {"name": "en"}
            }],
            "generation": self.generation(generation),
            "past_values": past,
            "machines": []
        })
    }

    async fn serve(&self, relative: &str, body: Value) {
        self.serve_with(relative, ResponseTemplate::new(200).set_body_json(body), 5)
            .await;
    }

    /// Mount a response; lower `priority` values win over the defaults.
    async fn serve_with(&self, relative: &str, response: ResponseTemplate, priority: u8) {
        Mock::given(method("GET"))
            .and(path(format!("{API}/{relative}")))
            .respond_with(response)
            .with_priority(priority)
            .mount(&self.server)
            .await;
    }

    async fn source(&self) -> Arc<CanonicalSource> {
        let transport = HttpFetcher::with_timeout(Duration::from_secs(10), "pokedb-tests").unwrap();
        let cache = FetchCache::new(Arc::new(transport), 4).with_retry(RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        });
        Arc::new(CanonicalSource::new(Arc::new(cache), &self.url("")).unwrap())
    }
}

async fn collector(api: &Api, out: &TempDir, target: u32) -> Collector {
    collector_with_records(api, out, target, None).await
}

async fn collector_with_records(
    api: &Api,
    out: &TempDir,
    target: u32,
    records: Option<&Path>,
) -> Collector {
    let source = api.source().await;
    let latest = source.latest_generation().await.unwrap();
    let catalog = Arc::new(source.catalog(latest).await.unwrap());
    let mut changes = CompositeProvider::new().with(Arc::new(PastValuesProvider::new(
        Arc::clone(&source),
        Arc::clone(&catalog),
    )));
    if let Some(dir) = records {
        changes = changes.with(Arc::new(ScrapedChangeLogProvider::new(dir, latest)));
    }
    let storage = OutputStorage::new(out.path(), Generation::new(target));
    storage.prepare(false).unwrap();
    Collector::new(
        source,
        catalog,
        Arc::new(changes),
        Arc::new(storage),
        Generation::new(target),
    )
    .with_workers(4)
}

fn read_json(out: &TempDir, relative: &str) -> Value {
    let text = std::fs::read_to_string(out.path().join(relative)).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn failed_entities_do_not_stop_their_siblings() {
    let api = Api::start().await;
    let out = TempDir::new().unwrap();
    let collector = collector(&api, &out, 1).await;

    let outcome = collector.run(&[ResourceKind::Move]).await.unwrap();

    assert!(outcome.is_partial());
    let report = &outcome.report.kinds[&ResourceKind::Move];
    assert_eq!(report.written, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);

    let failure = &outcome.report.failures[0];
    assert_eq!(failure.name, "vanished");
    assert_eq!(failure.category, "upstream");

    let skip = &outcome.report.skips[0];
    assert_eq!(skip.name, "sketch");
    assert!(skip.reason.contains("introduced in 2"));
    assert!(!out.path().join("gen-1/move/sketch.json").exists());

    let written = read_json(&out, "gen-1/report.json");
    assert_eq!(written["partial"], true);
    assert_eq!(written["failures"][0]["id"], 90);
}

#[tokio::test]
async fn moves_are_rolled_back_to_their_past_values() {
    let api = Api::start().await;
    let out = TempDir::new().unwrap();
    collector(&api, &out, 1)
        .await
        .run(&[ResourceKind::Move])
        .await
        .unwrap();

    let tackle = read_json(&out, "gen-1/move/tackle.json");
    assert_eq!(tackle["power"], 35);
    assert_eq!(tackle["accuracy"], 95);
    assert_eq!(tackle["pp"], 35);
    assert_eq!(tackle["introduced_at"], 1);

    let latest = TempDir::new().unwrap();
    collector(&api, &latest, 2)
        .await
        .run(&[ResourceKind::Move])
        .await
        .unwrap();
    let tackle = read_json(&latest, "gen-2/move/tackle.json");
    assert_eq!(tackle["power"], 40);
    assert_eq!(tackle["accuracy"], 100);
}

#[tokio::test]
async fn species_are_rewound_from_both_history_sources() {
    let api = Api::start().await;
    let records = TempDir::new().unwrap();
    std::fs::write(
        records.path().join("clefairy.json"),
        json!({
            "metadata": {"name": "clefairy"},
            "changes": [
                {"generations": [1], "change": {"types": ["Normal"]}},
                {"generations": [1], "change": {
                    "stats": {"special": 60},
                    "ev_yield": [{"stat": "hp", "effort": 1}]
                }},
                {"generations": [1], "change": {"ev_yield": [{"stat": "hp", "effort": 3}]}}
            ]
        })
        .to_string(),
    )
    .unwrap();
    let out = TempDir::new().unwrap();

    let outcome = collector_with_records(&api, &out, 1, Some(records.path()))
        .await
        .run(&[ResourceKind::Species])
        .await
        .unwrap();

    assert!(!outcome.is_partial());
    assert_eq!(outcome.report.kinds[&ResourceKind::Species].written, 1);

    let clefairy = read_json(&out, "gen-1/pokemon/clefairy.json");
    assert_eq!(clefairy["types"], json!(["normal"]));
    assert_eq!(clefairy["stats"]["hp"], 70);
    assert_eq!(clefairy["stats"]["special-attack"], 60);
    assert_eq!(clefairy["stats"]["special-defense"], 60);
    assert_eq!(clefairy["ev_yield"], json!([{"stat": "hp", "effort": 3}]));
    let abilities: Vec<&str> = clefairy["abilities"]
        .as_array()
        .unwrap()
        .iter()
        .map(|a| a["name"].as_str().unwrap())
        .collect();
    assert_eq!(abilities, ["cute-charm"]);

    let current = TempDir::new().unwrap();
    collector_with_records(&api, &current, 2, Some(records.path()))
        .await
        .run(&[ResourceKind::Species])
        .await
        .unwrap();
    let clefairy = read_json(&current, "gen-2/pokemon/clefairy.json");
    assert_eq!(clefairy["types"], json!(["fairy"]));
    assert_eq!(clefairy["stats"]["special-defense"], 65);
    assert_eq!(clefairy["ev_yield"], json!([{"stat": "hp", "effort": 2}]));
}

#[tokio::test]
async fn summaries_and_index_are_deterministic() {
    let api = Api::start().await;
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    collector(&api, &first, 1)
        .await
        .run(&[ResourceKind::Move])
        .await
        .unwrap();
    collector(&api, &second, 1)
        .await
        .with_workers(1)
        .run(&[ResourceKind::Move])
        .await
        .unwrap();

    let summary = read_json(&first, "gen-1/move/summary.json");
    assert_eq!(summary, read_json(&second, "gen-1/move/summary.json"));
    let names: Vec<&str> = summary["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["pound", "tackle"]);
    assert_eq!(summary["entries"][1]["pointer"], "move/tackle.json");

    let index = read_json(&first, "gen-1/index.json");
    assert_eq!(index["metadata"]["generation"], 1);
    assert_eq!(index["metadata"]["latest_generation"], 2);
    assert_eq!(index["metadata"]["version_groups"], json!(["red-blue"]));
    assert_eq!(index["metadata"]["counts"]["move"], 2);
    assert_eq!(index["categories"]["move"], "move/summary.json");
}

#[tokio::test]
async fn listing_failure_skips_only_that_category() {
    let api = Api::start().await;
    let out = TempDir::new().unwrap();
    let collector = collector(&api, &out, 1).await;

    let outcome = collector
        .run(&[ResourceKind::Item, ResourceKind::Move])
        .await
        .unwrap();

    assert!(outcome.report.has_listing_errors());
    let items = &outcome.report.kinds[&ResourceKind::Item];
    assert!(items.listing_error.as_deref().unwrap().contains("item"));
    assert_eq!(outcome.report.kinds[&ResourceKind::Move].written, 2);
    assert!(!outcome.index.categories.contains_key(&ResourceKind::Item));
    assert!(!out.path().join("gen-1/item/summary.json").exists());
}

#[tokio::test]
async fn time_budget_keeps_finished_work() {
    let api = Api::start().await;
    api.serve_with(
        "move/1/",
        ResponseTemplate::new(200)
            .set_body_json(api.move_doc(1, "pound", 40, 1, &[]))
            .set_delay(Duration::from_secs(5)),
        1,
    )
    .await;
    let out = TempDir::new().unwrap();
    let collector = collector(&api, &out, 1)
        .await
        .with_time_budget(Some(Duration::from_millis(500)));

    let outcome = collector.run(&[ResourceKind::Move]).await.unwrap();

    assert!(outcome.is_partial());
    let report = &outcome.report.kinds[&ResourceKind::Move];
    assert_eq!(report.cancelled, 1);
    assert!(out.path().join("gen-1/move/tackle.json").exists());
    assert!(!out.path().join("gen-1/move/pound.json").exists());
    assert_eq!(read_json(&out, "gen-1/index.json")["metadata"]["partial"], true);
}

#[tokio::test]
async fn progress_reports_every_settled_task() {
    let api = Api::start().await;
    let out = TempDir::new().unwrap();
    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let collector = collector(&api, &out, 1)
        .await
        .with_progress(move |kind, done, total| sink.lock().unwrap().push((kind, done, total)));

    collector.run(&[ResourceKind::Move]).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.first(), Some(&(ResourceKind::Move, 0, 4)));
    assert_eq!(seen.last(), Some(&(ResourceKind::Move, 4, 4)));
    assert_eq!(seen.len(), 5);
}
