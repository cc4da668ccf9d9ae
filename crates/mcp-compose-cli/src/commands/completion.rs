use clap::Args;
use clap_complete::{generate, Shell};

#[derive(Args, Clone)]
pub struct CompletionArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

pub fn execute(args: &CompletionArgs, command: &mut clap::Command) {
    let name = command.get_name().to_string();
    generate(args.shell, command, name, &mut std::io::stdout());
}
