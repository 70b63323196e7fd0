pub mod frontmatter;

pub use frontmatter::{
    extract_yaml_frontmatter, parse_from_markdown, render_markdown, split_frontmatter,
};
