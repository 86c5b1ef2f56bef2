/// Shader source parser
///
/// A `.shader` file holds every stage of a shader plus its fixed-function
/// state. Lines starting with `#` are matched against the engine directives
/// by their first token; any other `#` line (`#version`, `#define`, ...) is
/// ordinary stage content.
///
/// ```text
/// #vulkan
/// #cull back
/// #blend srcalpha invsrcalpha
/// #queue transparent
/// #shader vertex
/// #version 450
/// #include "common.glsl"
/// void main() { ... }
/// #shader fragment
/// ...
/// ```
///
/// `#d3d11` / `#vulkan` guards partition the file: content, include and
/// state lines after a guard only count when it names the running API.

use crate::asset::vfs::{resolve_relative, VirtualFileSystem};
use crate::error::{Error, Result};
use crate::graphics_device::{
    BlendFactor, ColorBlendState, CompareOp, CullMode, DepthStencilState, GraphicsApi,
    MultisampleState, PolygonMode, RasterizationState, ShaderStage,
};

const LOG_SOURCE: &str = "lumen::Parser";

/// Nested include limit
const MAX_INCLUDE_DEPTH: usize = 16;

/// Fixed-function state directives
const STATE_DIRECTIVES: &[&str] = &[
    "cull",
    "fill",
    "zwrite",
    "ztest",
    "blend",
    "alphatomask",
    "queue",
    "depthbias",
    "dbslopescaled",
    "dbclamp",
    "depthclip",
    "scissor",
];

pub const QUEUE_BACKGROUND: i32 = 1000;
pub const QUEUE_GEOMETRY: i32 = 2000;
pub const QUEUE_ALPHA_TEST: i32 = 2450;
pub const QUEUE_TRANSPARENT: i32 = 3000;
pub const QUEUE_OVERLAY: i32 = 4000;
pub const DEFAULT_QUEUE: i32 = QUEUE_GEOMETRY;

/// Source of `#include`d files
pub trait IncludeSource {
    fn load_include(&self, virtual_path: &str) -> Result<String>;
}

impl IncludeSource for VirtualFileSystem {
    fn load_include(&self, virtual_path: &str) -> Result<String> {
        self.read_to_string(virtual_path)
    }
}

/// Fixed-function state declared by a shader file
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PipelineState {
    pub rasterization: RasterizationState,
    pub depth_stencil: DepthStencilState,
    pub color_blend: ColorBlendState,
    pub multisample: MultisampleState,
}

/// Result of parsing one shader file
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedShader {
    pub vertex: String,
    pub fragment: Option<String>,
    pub geometry: Option<String>,
    pub state: PipelineState,
    /// Render queue (draw order), lower first
    pub queue: i32,
    /// Every file pulled in through `#include`, in inclusion order
    pub includes: Vec<String>,
}

impl ParsedShader {
    /// Present stages in pipeline order
    pub fn stages(&self) -> Vec<(ShaderStage, &str)> {
        let mut stages = vec![(ShaderStage::Vertex, self.vertex.as_str())];
        if let Some(geometry) = &self.geometry {
            stages.push((ShaderStage::Geometry, geometry.as_str()));
        }
        if let Some(fragment) = &self.fragment {
            stages.push((ShaderStage::Fragment, fragment.as_str()));
        }
        stages
    }
}

/// Named render queue or integer
pub fn parse_queue(value: &str) -> Option<i32> {
    match value.to_ascii_lowercase().as_str() {
        "background" => Some(QUEUE_BACKGROUND),
        "geometry" => Some(QUEUE_GEOMETRY),
        "alphatest" => Some(QUEUE_ALPHA_TEST),
        "transparent" => Some(QUEUE_TRANSPARENT),
        "overlay" => Some(QUEUE_OVERLAY),
        other => other.parse().ok(),
    }
}

fn parse_switch(value: Option<&str>) -> Option<bool> {
    match value?.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

fn stage_index(stage: ShaderStage) -> usize {
    match stage {
        ShaderStage::Vertex => 0,
        ShaderStage::Fragment => 1,
        ShaderStage::Geometry => 2,
    }
}

/// Text following an `include` directive word, `#include"path"` included
fn include_directive(rest: &str) -> Option<&str> {
    let rest = rest.trim_start();
    let word = rest.get(.."include".len())?;
    let after = &rest["include".len()..];
    let delimited = after
        .chars()
        .next()
        .map_or(true, |c| c.is_whitespace() || c == '"' || c == '<');
    (word.eq_ignore_ascii_case("include") && delimited).then_some(after)
}

/// Path argument of `#include "path"` / `#include <path>`
fn include_argument(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let unquoted = rest
        .strip_prefix('"')
        .and_then(|r| r.strip_suffix('"'))
        .or_else(|| rest.strip_prefix('<').and_then(|r| r.strip_suffix('>')))
        .unwrap_or(rest);
    let unquoted = unquoted.trim();
    if unquoted.is_empty() {
        None
    } else {
        Some(unquoted)
    }
}

struct ParserState<'a> {
    file_path: &'a str,
    includes: &'a dyn IncludeSource,
    stages: [String; 3],
    state: PipelineState,
    queue: i32,
    included: Vec<String>,
}

impl<'a> ParserState<'a> {
    fn warn_malformed(&self, line_number: usize, line: &str) {
        crate::engine_warn!(
            LOG_SOURCE,
            "{}:{}: malformed directive '{}', ignored",
            self.file_path,
            line_number,
            line
        );
    }

    /// Append an included file (and its own includes) to `out`
    fn expand_include(&mut self, from: &str, argument: &str, depth: usize, out: &mut String) {
        let path = resolve_relative(from, argument);
        if depth >= MAX_INCLUDE_DEPTH {
            crate::engine_warn!(LOG_SOURCE, "{}: include depth limit reached at '{}'", self.file_path, path);
            return;
        }
        let text = match self.includes.load_include(&path) {
            Ok(text) => text,
            Err(e) => {
                crate::engine_warn!(LOG_SOURCE, "{}: missing include '{}' ({})", self.file_path, path, e);
                return;
            }
        };
        self.included.push(path.clone());

        for line in text.lines() {
            let trimmed = line.trim();
            let nested = trimmed.strip_prefix('#').and_then(include_directive);
            match nested.and_then(include_argument) {
                Some(inner) => self.expand_include(&path, inner, depth + 1, out),
                None => {
                    out.push_str(line);
                    out.push('\n');
                }
            }
        }
    }

    /// Apply one of `STATE_DIRECTIVES`, warning on malformed arguments
    fn apply_state(&mut self, directive: &str, args: &[&str], line_number: usize, line: &str) {
        let arg = args.first().copied();
        let ok = match directive {
            "cull" => match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("front") => {
                    self.state.rasterization.cull_mode = CullMode::Front;
                    true
                }
                Some("back") => {
                    self.state.rasterization.cull_mode = CullMode::Back;
                    true
                }
                Some("none") | Some("off") => {
                    self.state.rasterization.cull_mode = CullMode::None;
                    true
                }
                _ => false,
            },
            "fill" => match arg.map(str::to_ascii_lowercase).as_deref() {
                Some("solid") => {
                    self.state.rasterization.polygon_mode = PolygonMode::Fill;
                    true
                }
                Some("wireframe") => {
                    self.state.rasterization.polygon_mode = PolygonMode::Line;
                    true
                }
                _ => false,
            },
            "zwrite" => parse_switch(arg)
                .map(|on| self.state.depth_stencil.depth_write_enable = on)
                .is_some(),
            "ztest" => match arg {
                Some(value) if value.eq_ignore_ascii_case("off") => {
                    self.state.depth_stencil.depth_test_enable = false;
                    true
                }
                Some(value) => match CompareOp::from_name(value) {
                    Some(op) => {
                        self.state.depth_stencil.depth_test_enable = true;
                        self.state.depth_stencil.depth_compare_op = op;
                        true
                    }
                    None => false,
                },
                None => false,
            },
            "blend" => match args {
                [value] if value.eq_ignore_ascii_case("off") => {
                    self.state.color_blend.blend_enable = false;
                    true
                }
                [src, dst, ..] => match (BlendFactor::from_name(src), BlendFactor::from_name(dst)) {
                    (Some(src), Some(dst)) => {
                        let blend = &mut self.state.color_blend;
                        blend.blend_enable = true;
                        blend.src_color_factor = src;
                        blend.dst_color_factor = dst;
                        blend.src_alpha_factor = src;
                        blend.dst_alpha_factor = dst;
                        true
                    }
                    _ => false,
                },
                _ => false,
            },
            "alphatomask" => parse_switch(arg)
                .map(|on| self.state.multisample.alpha_to_coverage = on)
                .is_some(),
            "queue" => arg.and_then(parse_queue).map(|queue| self.queue = queue).is_some(),
            "depthbias" | "dbslopescaled" | "dbclamp" => match arg.and_then(|a| a.parse::<f32>().ok()) {
                Some(value) => {
                    let bias = self.state.rasterization.depth_bias.get_or_insert_with(Default::default);
                    match directive {
                        "depthbias" => bias.constant_factor = value,
                        "dbslopescaled" => bias.slope_factor = value,
                        _ => bias.clamp = value,
                    }
                    true
                }
                None => false,
            },
            "depthclip" => parse_switch(arg)
                .map(|on| self.state.rasterization.depth_clip_enable = on)
                .is_some(),
            "scissor" => parse_switch(arg)
                .map(|on| self.state.rasterization.scissor_enable = on)
                .is_some(),
            _ => false,
        };
        if !ok {
            self.warn_malformed(line_number, line);
        }
    }
}

/// Parse a shader file for the running `api`
///
/// `file_path` is the virtual path of the file, used to resolve relative
/// includes and in diagnostics.
pub fn parse(source: &str, file_path: &str, api: GraphicsApi, includes: &dyn IncludeSource) -> Result<ParsedShader> {
    let mut parser = ParserState {
        file_path,
        includes,
        stages: Default::default(),
        state: PipelineState::default(),
        queue: DEFAULT_QUEUE,
        included: Vec::new(),
    };
    let mut guard: Option<GraphicsApi> = None;
    let mut current: Option<ShaderStage> = None;

    for (index, line) in source.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.starts_with("//") {
            continue;
        }
        let active = guard.map_or(true, |g| g == api);

        if let Some(rest) = trimmed.strip_prefix('#') {
            let tokens: Vec<&str> = rest.split_whitespace().collect();
            let directive = match include_directive(rest) {
                Some(_) => "include".to_string(),
                None => tokens.first().map(|t| t.to_ascii_lowercase()).unwrap_or_default(),
            };
            let args = tokens.get(1..).unwrap_or(&[]);

            if let Some(selected) = GraphicsApi::from_guard(&directive) {
                guard = Some(selected);
                continue;
            }

            match directive.as_str() {
                "shader" => {
                    if guard.is_none() {
                        return Err(Error::Parse(format!(
                            "{}:{}: No API specification before a #shader",
                            file_path, line_number
                        )));
                    }
                    if !active {
                        current = None;
                        continue;
                    }
                    current = args.first().and_then(|name| ShaderStage::from_name(name));
                    if current.is_none() {
                        parser.warn_malformed(line_number, trimmed);
                    }
                    continue;
                }
                "include" => {
                    if !active {
                        continue;
                    }
                    let Some(stage) = current else {
                        crate::engine_warn!(
                            LOG_SOURCE,
                            "{}:{}: #include outside a #shader block, ignored",
                            file_path,
                            line_number
                        );
                        continue;
                    };
                    match include_directive(rest).and_then(include_argument) {
                        Some(target) => {
                            let mut expanded = String::new();
                            parser.expand_include(file_path, target, 0, &mut expanded);
                            parser.stages[stage_index(stage)].push_str(&expanded);
                        }
                        None => parser.warn_malformed(line_number, trimmed),
                    }
                    continue;
                }
                name if STATE_DIRECTIVES.contains(&name) => {
                    if active {
                        parser.apply_state(name, args, line_number, trimmed);
                    }
                    continue;
                }
                _ => {}
            }
        }

        if active {
            if let Some(stage) = current {
                let target = &mut parser.stages[stage_index(stage)];
                target.push_str(line);
                target.push('\n');
            }
        }
    }

    let [vertex, fragment, geometry] = parser.stages;
    if vertex.trim().is_empty() {
        return Err(Error::Parse(format!("{}: Vertex shader source is empty.", file_path)));
    }
    let non_empty = |s: String| if s.trim().is_empty() { None } else { Some(s) };

    Ok(ParsedShader {
        vertex,
        fragment: non_empty(fragment),
        geometry: non_empty(geometry),
        state: parser.state,
        queue: parser.queue,
        includes: parser.included,
    })
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
