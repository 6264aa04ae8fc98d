// Scenario tests driving the engine and the sweep end to end over in-memory collaborators

mod engine;
