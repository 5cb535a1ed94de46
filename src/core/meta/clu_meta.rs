// src/core/meta/clu_meta.rs

//! cluMeta: the envelope carrying one version each of Smap, BMD, config, and
//! RMD, used during join handshakes and forced-primary takeover.

use super::{bmd::Bmd, config_meta::GlobalConfig, rmd::Rmd, smap::Smap};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CluMeta {
    pub smap: Option<Smap>,
    pub bmd: Bmd,
    pub config: GlobalConfig,
    pub rmd: Rmd,
}

impl CluMeta {
    /// The handshake variant sent to a joining node: everything except Smap,
    /// since the node's own descriptor -- not the primary's view of it -- is
    /// what the primary is soliciting.
    pub fn without_smap(&self) -> CluMeta {
        CluMeta {
            smap: None,
            bmd: self.bmd.clone(),
            config: self.config.clone(),
            rmd: self.rmd.clone(),
        }
    }
}
