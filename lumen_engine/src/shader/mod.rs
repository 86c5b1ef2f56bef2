/// Shader pipeline: parsing, compilation, reflection and declarations

pub mod declaration;
pub mod parser;
pub mod compiler;
pub mod reflection;

pub use declaration::*;
pub use parser::{parse, IncludeSource, ParsedShader, PipelineState};
pub use compiler::{CompileOptions, ShaderCompiler, StageCompiler, ENTRY_POINT};
pub use reflection::{
    reflect_stage, ImageDim, RawPushConstant, RawResource, RawResourceKind, RawStageReflection,
    RawUniformBuffer, RawVertexInput, ReflectedMember, ReflectedMemberType, ScalarKind,
    ShaderReflection, ShaderReflector, StageReflection,
};
