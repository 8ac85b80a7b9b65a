pub mod id;
pub mod error;
pub mod types;
pub mod lifecycle;
pub mod declaration;
pub mod node;
pub mod container;
pub mod model;
pub mod hierarchy;
pub mod copy;
pub mod merge;
pub mod render;

// Re-export commonly used types
pub use id::{NodeId, ContainerId};
pub use error::ModelError;
pub use types::{Modifier, TypeKind, TypeRef};
pub use lifecycle::{InitState, Lifecycle};
pub use declaration::{DeclHandle, DeclKind, Declaration, DeclarationSource};
pub use node::{Node, NodeData, NodeKind, Origin, Parent};
pub use container::{signature_key, ContainerData, Role};
pub use model::{CodeModel, Ownership};
pub use hierarchy::AllItems;
pub use copy::CopyMapper;
pub use merge::MergeStrategy;
