//! The `strandmark init` command.

use std::path::Path;

use anyhow::Result;

const STARTER_FILES: &[(&str, &str)] = &[
    ("strandmark.toml", SAMPLE_CONFIG),
    ("datasets/example.toml", EXAMPLE_DATASET),
    ("answers/example.toml", EXAMPLE_ANSWERS),
    ("rubrics/example.toml", EXAMPLE_RUBRICS),
];

pub fn execute() -> Result<()> {
    for (name, content) in STARTER_FILES {
        let path = Path::new(name);
        if path.exists() {
            println!("{name} already exists, skipping.");
            continue;
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        println!("Created {name}");
    }

    println!("\nNext steps:");
    println!("  1. Run: strandmark validate --dataset datasets --rubrics rubrics/example.toml");
    println!("  2. Run: strandmark simulate --dataset datasets --answers answers/example.toml --strand forces --level 6 --instant");
    println!("  3. Run: strandmark score --dataset datasets --answers answers/example.toml");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# strandmark configuration

# Unset: short answers are scored locally by keyword and concept coverage.
# default_grader = "anthropic"
grader_timeout_ms = 8000
correct_delay_ms = 1500
incorrect_delay_ms = 3000
unlock_threshold = 6.0
max_attempts = 3
strands = ["forces", "energy", "matter", "living-things"]
badges = ["Force Master", "Energy Expert", "Matter Maven", "Life Scientist"]
data_dir = "./strandmark-data"

[graders.anthropic]
type = "anthropic"
api_key = "${ANTHROPIC_API_KEY}"

[graders.ollama]
type = "ollama"
base_url = "http://localhost:11434"
model = "llama3.1"
"#;

const EXAMPLE_DATASET: &str = r#"[dataset]
id = "example"
name = "Example Science Dataset"
description = "A small forces and energy dataset to get started"

[[questions]]
id = "f6-mcq"
strand = "forces"
level = 6
type = "mcq"
prompt = "The net force on a trolley doubles. What happens to its acceleration?"
concept = "acceleration"
keywords = ["force", "acceleration"]
options = [
  { id = "a", text = "It doubles", is_correct = true },
  { id = "b", text = "It halves", is_correct = false, level = 2 },
  { id = "c", text = "It stays the same", is_correct = false },
]

[[questions]]
id = "f6-blank"
strand = "forces"
level = 6
type = "fill_blank"
prompt = "Complete the sentence."
template = "Friction acts in the ___ direction to motion and transfers energy as ___."
concept = "friction"
keywords = ["friction"]
blanks = [
  { accepted = ["opposite"], hints = ["Think about which way it pushes"] },
  { accepted = ["heat", "thermal energy"] },
]

[[questions]]
id = "f6-match"
strand = "forces"
level = 6
type = "match_click"
prompt = "Match each force to what causes it."
concept = "types of force"
left = ["gravity", "friction", "air resistance"]
right = ["mass", "rough surfaces", "moving through air"]
pairs = [
  { left = "gravity", right = "mass" },
  { left = "friction", right = "rough surfaces" },
  { left = "air resistance", right = "moving through air" },
]

[[questions]]
id = "e4-short"
strand = "energy"
level = 4
type = "short_answer"
prompt = "What happens to the particles in ice when it melts?"
concept = "changes of state"
min_words = 5
max_words = 60
required_keywords = ["energy", "particles"]
"#;

const EXAMPLE_ANSWERS: &str = r#"# Repeated entries for a question are used as retries by `simulate`.

[[answers]]
question = "f6-mcq"
answer = { kind = "choice", value = "b" }

[[answers]]
question = "f6-mcq"
answer = { kind = "choice", value = "a" }

[[answers]]
question = "f6-blank"
answer = { kind = "blanks", value = ["opposite", "thermal energy"] }
time_spent_ms = 5200

[[answers]]
question = "f6-match"

[answers.answer]
kind = "matches"
value = [
  { left = "gravity", right = "mass" },
  { left = "friction", right = "rough surfaces" },
  { left = "air resistance", right = "moving through air" },
]

[[answers]]
question = "e4-short"
answer = { kind = "text", value = "The particles gain energy and start to slide past each other." }
time_spent_ms = 42000
"#;

const EXAMPLE_RUBRICS: &str = r#"[[rubrics]]
path = "default"
strand = "forces"
keywords = [
  { label = "force", level = 2, synonyms = ["push", "pull"] },
  { label = "gravity", level = 4, synonyms = ["gravitational"] },
  { label = "acceleration", level = 6, synonyms = ["accelerate"] },
  { label = "net force", level = 8, synonyms = ["resultant force"] },
]
concepts = [
  { label = "cause and effect", level = 2, synonyms = ["because"] },
  { label = "fair test", level = 4, synonyms = ["controlled variable"] },
  { label = "proportionality", level = 8, synonyms = ["directly proportional"] },
]
suggestions = [
  "Compare your results with a classmate's.",
  "Say how you could make the test fairer.",
  "Link your conclusion back to your prediction.",
]
"#;
