//! Species documents: the species merged with its default pokemon.
//!
//! Substructures tied to a generation carry markers:
//!
//! - hidden abilities: introduced in generation 5
//! - evolution chain links: the evolved species' generation
//! - forms: the generation of the version group they debuted in
//! - regional dex numbers, held items, learnsets and flavor text: one entry
//!   per game, marked with that game's generation and retired after it
//!
//! The national dex number and everything else is unmarked.

use futures::future::{BoxFuture, FutureExt, try_join_all};
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::warn;

use super::{Projector, field_or_null, generation_ref, name_or_null, names, required_str, required_u32, text};
use crate::document::{Document, INTRODUCED_AT, RETIRED_AT, as_u32, object, ref_name};
use crate::types::{Generation, ResourceId, ResourceKind};
use crate::Result;

/// Generation hidden abilities were introduced in.
const HIDDEN_ABILITY_GENERATION: Generation = Generation::new(5);

const NATIONAL_DEX: &str = "national";

/// Evolution requirements that are named references.
const DETAIL_REFERENCES: [&str; 9] = [
    "item",
    "trigger",
    "held_item",
    "known_move",
    "known_move_type",
    "location",
    "party_species",
    "party_type",
    "trade_species",
];

/// Evolution requirements copied as-is.
const DETAIL_SCALARS: [&str; 9] = [
    "gender",
    "min_level",
    "min_happiness",
    "min_beauty",
    "min_affection",
    "needs_overworld_rain",
    "relative_physical_stats",
    "time_of_day",
    "turn_upside_down",
];

/// Species-level fields copied verbatim.
const SPECIES_SCALARS: [&str; 10] = [
    "base_happiness",
    "capture_rate",
    "hatch_counter",
    "gender_rate",
    "has_gender_differences",
    "is_baby",
    "is_legendary",
    "is_mythical",
    "forms_switchable",
    "order",
];

pub(super) async fn project(
    projector: &Projector,
    id: &ResourceId,
    species: &Document,
) -> Result<Document> {
    let species_value = species.as_value();
    let species_name = required_str(species, "name", &id.name)?;
    let species_id = required_u32(species, "id", &id.name)?;

    let varieties = species.array_field("varieties");
    let default_url = varieties
        .iter()
        .find(|v| v.get("is_default").and_then(Value::as_bool).unwrap_or(false))
        .or_else(|| varieties.first())
        .and_then(|v| v.get("pokemon"))
        .and_then(|p| p.get("url"))
        .and_then(Value::as_str)
        .map_or_else(
            || projector.source().resource_url(ResourceKind::Pokemon, species_id),
            str::to_string,
        );
    let pokemon = projector.source().fetch_url(&default_url).await?;
    let pokemon_value = pokemon.as_value();

    let evolution_chain = match species
        .field("evolution_chain")
        .and_then(|c| c.get("url"))
        .and_then(Value::as_str)
    {
        Some(url) => match evolution_chain(projector, url).await {
            Ok(chain) => chain,
            Err(e) => {
                warn!("Could not build evolution chain for {}: {}", species_name, e);
                Value::Null
            },
        },
        None => Value::Null,
    };
    let forms = forms(projector, varieties, &pokemon).await?;

    let catalog = projector.catalog();
    let mut doc = Map::new();
    doc.insert("id".into(), Value::from(species_id));
    doc.insert("name".into(), Value::from(required_str(&pokemon, "name", &id.name)?));
    doc.insert("species".into(), Value::from(species_name));
    doc.insert("is_default".into(), Value::Bool(true));
    doc.insert("source_url".into(), Value::from(default_url.as_str()));
    if let Some(generation) = generation_ref(species_value) {
        doc.insert(INTRODUCED_AT.into(), Value::from(generation.get()));
    }
    doc.insert("generation".into(), name_or_null(species_value, "generation"));

    doc.insert("types".into(), types(&pokemon));
    doc.insert("abilities".into(), abilities(&pokemon));
    doc.insert("stats".into(), stats(&pokemon));
    doc.insert("ev_yield".into(), ev_yield(&pokemon));
    doc.insert("height".into(), field_or_null(pokemon_value, "height"));
    doc.insert("weight".into(), field_or_null(pokemon_value, "weight"));
    doc.insert("base_experience".into(), field_or_null(pokemon_value, "base_experience"));
    doc.insert(
        "cries".into(),
        pokemon.field("cries").cloned().unwrap_or_else(|| Value::Object(Map::new())),
    );
    doc.insert("sprites".into(), sprites(pokemon.field("sprites")));

    for key in SPECIES_SCALARS {
        doc.insert(key.into(), field_or_null(species_value, key));
    }
    for key in ["growth_rate", "habitat", "evolves_from_species", "color", "shape"] {
        doc.insert(key.into(), name_or_null(species_value, key));
    }
    doc.insert("egg_groups".into(), names(species_value, "egg_groups"));
    doc.insert(
        "genus".into(),
        text::english(species.array_field("genera"), "genus").map_or(Value::Null, Value::from),
    );
    doc.insert(
        "flavor_text".into(),
        text::english_by_game(
            species.array_field("flavor_text_entries"),
            "flavor_text",
            "version",
            |version| catalog.generation_of_version(version),
        ),
    );
    doc.insert("pokedex_numbers".into(), pokedex_numbers(projector, species));
    doc.insert("evolution_chain".into(), evolution_chain);
    doc.insert("forms".into(), forms);
    doc.insert("held_items".into(), held_items(projector, &pokemon));
    doc.insert("moves".into(), learnset(projector, &pokemon));

    Ok(Document::new(Value::Object(doc)))
}

/// Markers for an entry that only exists in one generation's games.
fn per_game(mut fields: Vec<(&str, Value)>, generation: Generation) -> Value {
    fields.push((INTRODUCED_AT, Value::from(generation.get())));
    fields.push((RETIRED_AT, Value::from(generation.next().get())));
    object(fields)
}

fn types(pokemon: &Document) -> Value {
    pokemon
        .array_field("types")
        .iter()
        .filter_map(|t| ref_name(t, "type"))
        .map(Value::from)
        .collect()
}

fn abilities(pokemon: &Document) -> Value {
    pokemon
        .array_field("abilities")
        .iter()
        .filter_map(|a| {
            let name = ref_name(a, "ability")?;
            let hidden = a.get("is_hidden").and_then(Value::as_bool).unwrap_or(false);
            let mut fields = vec![
                ("name", Value::from(name)),
                ("is_hidden", Value::Bool(hidden)),
                ("slot", field_or_null(a, "slot")),
            ];
            if hidden {
                fields.push((INTRODUCED_AT, Value::from(HIDDEN_ABILITY_GENERATION.get())));
            }
            Some(object(fields))
        })
        .collect()
}

fn stats(pokemon: &Document) -> Value {
    object(pokemon.array_field("stats").iter().filter_map(|s| {
        let name = ref_name(s, "stat")?;
        Some((name, field_or_null(s, "base_stat")))
    }))
}

fn ev_yield(pokemon: &Document) -> Value {
    pokemon
        .array_field("stats")
        .iter()
        .filter_map(|s| {
            let effort = s.get("effort").and_then(as_u32).filter(|e| *e > 0)?;
            Some(object([
                ("stat", name_or_null(s, "stat")),
                ("effort", Value::from(effort)),
            ]))
        })
        .collect()
}

/// Sprite URLs without the per-game `versions` subtree or empty slots.
fn sprites(sprites: Option<&Value>) -> Value {
    let Some(map) = sprites.and_then(Value::as_object) else {
        return Value::Object(Map::new());
    };
    Value::Object(
        map.iter()
            .filter(|(key, value)| key.as_str() != "versions" && !value.is_null())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

/// National dex number plus each generation's main regional dex number.
fn pokedex_numbers(projector: &Projector, species: &Document) -> Value {
    species
        .array_field("pokedex_numbers")
        .iter()
        .filter_map(|entry| {
            let pokedex = ref_name(entry, "pokedex")?;
            let fields = vec![
                ("pokedex", Value::from(pokedex)),
                ("entry_number", field_or_null(entry, "entry_number")),
            ];
            if pokedex == NATIONAL_DEX {
                return Some(object(fields));
            }
            let generation = projector.catalog().regional_pokedex_generation(pokedex)?;
            Some(per_game(fields, generation))
        })
        .collect()
}

fn held_items(projector: &Projector, pokemon: &Document) -> Value {
    let catalog = projector.catalog();
    let mut entries = Vec::new();
    for held in pokemon.array_field("held_items") {
        let Some(item) = ref_name(held, "item") else {
            continue;
        };
        let details = held.get("version_details").and_then(Value::as_array);
        for detail in details.into_iter().flatten() {
            let Some(version) = ref_name(detail, "version") else {
                continue;
            };
            let Some(generation) = catalog.generation_of_version(version) else {
                continue;
            };
            entries.push(per_game(
                vec![
                    ("item", Value::from(item)),
                    ("version", Value::from(version)),
                    ("rarity", field_or_null(detail, "rarity")),
                ],
                generation,
            ));
        }
    }
    Value::Array(entries)
}

fn learnset(projector: &Projector, pokemon: &Document) -> Value {
    let catalog = projector.catalog();
    let mut entries = Vec::new();
    for learned in pokemon.array_field("moves") {
        let Some(name) = ref_name(learned, "move") else {
            continue;
        };
        let details = learned.get("version_group_details").and_then(Value::as_array);
        for detail in details.into_iter().flatten() {
            let Some(group) = ref_name(detail, "version_group") else {
                continue;
            };
            let Some(generation) = catalog.generation_of_version_group(group) else {
                continue;
            };
            entries.push(per_game(
                vec![
                    ("name", Value::from(name)),
                    ("method", name_or_null(detail, "move_learn_method")),
                    ("level_learned_at", field_or_null(detail, "level_learned_at")),
                    ("version_group", Value::from(group)),
                ],
                generation,
            ));
        }
    }
    Value::Array(entries)
}

async fn evolution_chain(projector: &Projector, url: &str) -> Result<Value> {
    let chain = projector.source().fetch_url(url).await?;
    let root = chain
        .field("chain")
        .ok_or_else(|| crate::Error::projection(url, "evolution chain has no root link"))?;
    let evolves_to = evolution_links(projector, root).await?;
    Ok(object([
        ("species_name", ref_name(root, "species").map_or(Value::Null, Value::from)),
        ("evolves_to", evolves_to),
    ]))
}

/// Links evolving from `link`, each marked with the evolved species' generation.
fn evolution_links<'a>(projector: &'a Projector, link: &'a Value) -> BoxFuture<'a, Result<Value>> {
    async move {
        let children = link
            .get("evolves_to")
            .and_then(Value::as_array)
            .map_or(&[][..], Vec::as_slice);
        let mut links = Vec::with_capacity(children.len());
        for child in children {
            let species_url = child
                .get("species")
                .and_then(|s| s.get("url"))
                .and_then(Value::as_str);
            let generation = match species_url {
                Some(url) => generation_ref(projector.source().fetch_url(url).await?.as_value()),
                None => None,
            };

            let details = child
                .get("evolution_details")
                .and_then(Value::as_array)
                .and_then(|d| d.first());
            let mut fields = vec![
                ("species_name", ref_name(child, "species").map_or(Value::Null, Value::from)),
                ("evolution_details", evolution_details(details)),
                ("evolves_to", evolution_links(projector, child).await?),
            ];
            if let Some(generation) = generation {
                fields.push((INTRODUCED_AT, Value::from(generation.get())));
            }
            links.push(object(fields));
        }
        Ok(Value::Array(links))
    }
    .boxed()
}

fn evolution_details(details: Option<&Value>) -> Value {
    let empty = Value::Object(Map::new());
    let details = details.unwrap_or(&empty);
    let references = DETAIL_REFERENCES
        .iter()
        .map(|key| (*key, name_or_null(details, key)));
    let scalars = DETAIL_SCALARS
        .iter()
        .map(|key| (*key, field_or_null(details, key)));
    object(references.chain(scalars))
}

/// Varieties and cosmetic forms, sorted by name.
async fn forms(projector: &Projector, varieties: &[Value], default: &Document) -> Result<Value> {
    let variety_pokemon = try_join_all(varieties.iter().filter_map(|variety| {
        let url = variety.get("pokemon")?.get("url")?.as_str()?;
        let is_default = variety.get("is_default").and_then(Value::as_bool).unwrap_or(false);
        Some(async move { Ok::<_, crate::Error>((is_default, projector.source().fetch_url(url).await?)) })
    }))
    .await?;

    let mut variety_form_urls = HashSet::new();
    let mut entries: Vec<(String, Value)> = Vec::new();
    for (is_default, pokemon) in &variety_pokemon {
        let Some(form_url) = pokemon
            .array_field("forms")
            .first()
            .and_then(|f| f.get("url"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        variety_form_urls.insert(form_url.to_string());
        let form = projector.source().fetch_url(form_url).await?;
        let category = if *is_default {
            "default"
        } else if form.field("is_battle_only").and_then(Value::as_bool).unwrap_or(false) {
            "transformation"
        } else {
            "variant"
        };
        let name = pokemon.name().unwrap_or_default().to_string();
        entries.push((name.clone(), form_entry(projector, &name, category, &form)));
    }

    for form_ref in default.array_field("forms") {
        let Some(url) = form_ref.get("url").and_then(Value::as_str) else {
            continue;
        };
        if variety_form_urls.contains(url) {
            continue;
        }
        let form = projector.source().fetch_url(url).await?;
        if form.field("is_default").and_then(Value::as_bool).unwrap_or(false) {
            continue;
        }
        let name = form.name().unwrap_or_default().to_string();
        entries.push((name.clone(), form_entry(projector, &name, "cosmetic", &form)));
    }

    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(Value::Array(entries.into_iter().map(|(_, entry)| entry).collect()))
}

fn form_entry(projector: &Projector, name: &str, category: &str, form: &Document) -> Value {
    let mut fields = vec![("name", Value::from(name)), ("category", Value::from(category))];
    if let Some(generation) = projector
        .catalog()
        .generation_of_group_ref(form.as_value(), "version_group")
    {
        fields.push((INTRODUCED_AT, Value::from(generation.get())));
    }
    object(fields)
}
