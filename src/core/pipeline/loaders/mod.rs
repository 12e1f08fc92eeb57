pub mod expr;
pub mod hash;
pub mod text;
pub mod yaml;

use crate::core::pipeline::loader::LoaderRegistryBuilder;

pub use expr::ExprLoader;

/// Register the built-in loaders into the supplied builder.
pub fn register_builtins(builder: &mut LoaderRegistryBuilder) {
    builder
        .register(yaml::YamlToJsonLoader::new())
        .register(yaml::JsonPrettyLoader::new())
        .register(text::LengthLoader::new())
        .register(text::AppendLoader::new())
        .register(text::PrependLoader::new())
        .register(text::UppercaseLoader::new())
        .register(hash::HashLoader::new());
}
