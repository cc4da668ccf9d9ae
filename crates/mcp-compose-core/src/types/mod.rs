//! Data exchanged with backends: tools, resources, prompts.

pub mod prompts;
pub mod resources;
pub mod tools;

pub use prompts::{ListPromptsResponse, Prompt};
pub use resources::{ListResourcesResponse, Resource};
pub use tools::{
    ListToolsResponse, Tool, ToolAnnotations, ToolCallRequest, ToolCallResponse, ToolContent,
};
