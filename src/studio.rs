use crate::compiler::{Compilation, Compiler};
use crate::error::Result;
use crate::providers::VideoGenerator;
use crate::queue::AssetRef;
use crate::scheduler::Studio;
use crate::voiceover::VoiceoverProcessor;
use async_trait::async_trait;

/// Real media pipeline: remote generation, ElevenLabs + ffmpeg narration, ffmpeg compilation.
pub struct MediaStudio {
    pub generator: VideoGenerator,
    pub voiceover: VoiceoverProcessor,
    pub compiler: Compiler,
}

#[async_trait]
impl Studio for MediaStudio {
    async fn generate(&mut self, prompt: &str, duration_secs: u32) -> Result<AssetRef> {
        self.generator.generate(prompt, duration_secs).await
    }

    async fn process(&mut self, raw: &AssetRef) -> Result<AssetRef> {
        self.voiceover.add_voiceover(raw).await
    }

    async fn compile(&mut self, assets: &[AssetRef]) -> Result<Compilation> {
        self.compiler.compile(assets).await
    }
}
